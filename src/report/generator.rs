//! Report generation.
//!
//! This module renders aggregated reward metrics as a console table,
//! a Markdown document or JSON.

use crate::analysis::{group_by_signal, skip_counts};
use crate::config::ReportConfig;
use crate::models::{BatchReport, MetricStat, MetricsReport, Report, ReportMetadata};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, options: &ReportConfig) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Reward Metrics Report\n\n");

    // Metadata section
    output.push_str(&generate_metadata_section(&report.metadata));

    // Table of contents
    output.push_str(&generate_table_of_contents(report));

    // Per-batch metrics
    output.push_str(&generate_batches_section(&report.batches, options));

    // Signals skipped across batches
    if options.include_skipped {
        output.push_str(&generate_skipped_summary(&report.batches));
    }

    // Footer
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** `{}`\n", metadata.source));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Batches:** {}\n", metadata.batches));
    if metadata.batches_failed > 0 {
        section.push_str(&format!(
            "- **Batches Failed:** {}\n",
            metadata.batches_failed
        ));
    }
    section.push_str(&format!("- **Samples:** {}\n", metadata.samples));
    section.push_str(&format!(
        "- **Signals Reported:** {}\n",
        metadata.signals_reported
    ));
    section.push_str(&format!(
        "- **Signals Skipped:** {}\n",
        metadata.signals_skipped
    ));
    section.push_str(&format!(
        "- **Duration:** {:.2}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(report: &Report) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Batches](#batches)\n");

    for batch in &report.batches {
        toc.push_str(&format!("  - [{}](#{})\n", batch.name, anchor(&batch.name)));
    }

    toc.push('\n');

    toc
}

fn anchor(name: &str) -> String {
    name.replace(['/', '.', ' ', '\\'], "-").to_lowercase()
}

/// Generate the per-batch sections.
fn generate_batches_section(batches: &[BatchReport], options: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Batches\n\n");

    if batches.is_empty() {
        section.push_str("No batches were aggregated.\n\n");
        return section;
    }

    for batch in batches {
        section.push_str(&generate_batch_section(batch, options));
    }

    section
}

/// Generate the section for a single batch.
fn generate_batch_section(batch: &BatchReport, options: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str(&format!("### {} {{#{}}}\n\n", batch.name, anchor(&batch.name)));

    let score = batch
        .mean_score
        .map(|s| format!("{:.*}", options.precision, s))
        .unwrap_or_else(|| "n/a".to_string());
    section.push_str(&format!(
        "*Samples: {} | Mean score: {} | Signals: {}*\n\n",
        batch.samples,
        score,
        batch.metrics.signals().len()
    ));

    section.push_str(&generate_metrics_table(&batch.metrics, options.precision));

    if options.include_skipped && !batch.skipped.is_empty() {
        section.push_str("**Skipped signals:**\n\n");
        for skipped in &batch.skipped {
            section.push_str(&format!("- `{}`: {}\n", skipped.signal, skipped.reason));
        }
        section.push('\n');
    }

    section
}

/// Generate a signal x statistic Markdown table.
fn generate_metrics_table(metrics: &MetricsReport, precision: usize) -> String {
    let grouped = group_by_signal(metrics);

    if grouped.is_empty() {
        return "No signals produced metrics.\n\n".to_string();
    }

    let mut table = String::new();
    table.push_str("| Signal | Mean | Max | Min | Std | Count |\n");
    table.push_str("|:---|---:|---:|---:|---:|---:|\n");

    for (signal, stats) in &grouped {
        let cells: Vec<String> = MetricStat::ALL
            .iter()
            .map(|stat| {
                stats
                    .get(stat)
                    .map(|v| v.format(precision))
                    .unwrap_or_else(|| "-".to_string())
            })
            .collect();
        table.push_str(&format!("| `{}` | {} |\n", signal, cells.join(" | ")));
    }
    table.push('\n');

    table
}

/// Generate the cross-batch skip summary.
fn generate_skipped_summary(batches: &[BatchReport]) -> String {
    let counts = skip_counts(batches);
    if counts.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Skipped Signals\n\n");
    section.push_str("| Signal | Batches Skipped |\n");
    section.push_str("|:---|:---:|\n");
    for (signal, count) in counts {
        section.push_str(&format!("| `{}` | {} |\n", signal, count));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by reward-metrics*\n");

    footer
}

/// Generate a plain-text report for terminals.
pub fn generate_console_report(report: &Report, options: &ReportConfig) -> String {
    let mut output = String::new();

    for batch in &report.batches {
        output.push_str(&format!("== {} ({} samples)\n", batch.name, batch.samples));

        let width = batch.metrics.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in batch.metrics.iter() {
            output.push_str(&format!(
                "  {:<width$}  {}\n",
                key,
                value.format(options.precision),
                width = width
            ));
        }

        if options.include_skipped {
            for skipped in &batch.skipped {
                output.push_str(&format!("  skipped {}\n", skipped));
            }
        }
    }

    output
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricValue, SkipReason, SkippedSignal};
    use chrono::Utc;

    fn create_test_report() -> Report {
        let mut metrics = MetricsReport::new();
        metrics.insert("fluency", MetricStat::Mean, MetricValue::Float(0.8125));
        metrics.insert("fluency", MetricStat::Max, MetricValue::Float(0.9));
        metrics.insert("fluency", MetricStat::Min, MetricValue::Float(0.7));
        metrics.insert("fluency", MetricStat::Std, MetricValue::Float(0.07396));
        metrics.insert("fluency", MetricStat::Count, MetricValue::Count(4));

        let metadata = ReportMetadata {
            source: "rollouts/".to_string(),
            generated_at: Utc::now(),
            batches: 1,
            batches_failed: 1,
            samples: 4,
            signals_reported: 1,
            signals_skipped: 1,
            duration_seconds: 0.25,
        };

        Report {
            metadata,
            batches: vec![BatchReport {
                name: "step_0100.json".to_string(),
                samples: 4,
                mean_score: Some(0.75),
                metrics,
                skipped: vec![SkippedSignal {
                    signal: "data_source".to_string(),
                    reason: SkipReason::NonNumeric {
                        index: 0,
                        found: "string".to_string(),
                    },
                }],
            }],
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report, &ReportConfig::default());

        assert!(markdown.contains("# Reward Metrics Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Batches"));
        assert!(markdown.contains("step_0100.json"));
        assert!(markdown.contains("| `fluency` | 0.8125 | 0.9000 | 0.7000 | 0.0740 | 4 |"));
        assert!(markdown.contains("## Skipped Signals"));
        assert!(markdown.contains("non-numeric string value"));
    }

    #[test]
    fn test_markdown_without_skipped() {
        let report = create_test_report();
        let options = ReportConfig {
            include_skipped: false,
            ..ReportConfig::default()
        };
        let markdown = generate_markdown_report(&report, &options);

        assert!(!markdown.contains("Skipped Signals"));
        assert!(!markdown.contains("data_source"));
    }

    #[test]
    fn test_generate_metadata_section() {
        let report = create_test_report();
        let section = generate_metadata_section(&report.metadata);

        assert!(section.contains("rollouts/"));
        assert!(section.contains("Batches Failed:"));
        assert!(section.contains("Signals Skipped:** 1"));
    }

    #[test]
    fn test_metrics_table_marks_missing_stats() {
        let mut metrics = MetricsReport::new();
        metrics.insert("single", MetricStat::Mean, MetricValue::Float(0.42));

        let table = generate_metrics_table(&metrics, 2);
        assert!(table.contains("| `single` | 0.42 | - | - | - | - |"));
    }

    #[test]
    fn test_generate_console_report() {
        let report = create_test_report();
        let console = generate_console_report(&report, &ReportConfig::default());

        assert!(console.contains("== step_0100.json (4 samples)"));
        assert!(console.contains("reward/fluency/count"));
        assert!(console.contains("skipped data_source"));
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"reward/fluency/mean\": 0.8125"));
        assert!(json.contains("\"reward/fluency/count\": 4"));
        assert!(json.contains("\"kind\": \"non_numeric\""));
    }
}
