//! Reward metrics aggregation and statistics.
//!
//! This module reduces each named sub-reward series of a scoring batch to
//! summary statistics. A signal that cannot be summarized is skipped with a
//! reason; it never fails the batch.

use super::normalize::{normalize_series, NormalizedSeries};
use crate::batch::RecordedBatch;
use crate::collector::SCORE_KEY;
use crate::models::{
    split_metric_key, Aggregation, BatchReport, MetricStat, MetricValue, MetricsReport,
    RawObservation, SignalSeries, SignalStats, SkipReason, SkippedSignal, StdMode,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Options controlling which signals are summarized and how.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorOptions {
    /// Keys never summarized (the primary training score by default).
    pub excluded_keys: Vec<String>,
    /// Emit the `count` statistic.
    pub emit_count: bool,
    /// Standard deviation estimator.
    pub std_mode: StdMode,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            excluded_keys: vec![SCORE_KEY.to_string()],
            emit_count: true,
            std_mode: StdMode::Population,
        }
    }
}

impl From<&crate::config::AggregationConfig> for AggregatorOptions {
    fn from(config: &crate::config::AggregationConfig) -> Self {
        Self {
            excluded_keys: config.excluded_keys.clone(),
            emit_count: config.emit_count,
            std_mode: config.std,
        }
    }
}

/// Stateless reducer from signal series to a metrics report.
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    options: AggregatorOptions,
}

impl MetricsAggregator {
    pub fn new(options: AggregatorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    /// Aggregate every signal of a batch.
    ///
    /// Each signal is processed on its own; failures are collected in
    /// [`Aggregation::skipped`] and logged, and never affect other signals.
    pub fn aggregate<'a, I, K>(&self, series_by_name: I) -> Aggregation
    where
        I: IntoIterator<Item = (K, &'a SignalSeries)>,
        K: AsRef<str>,
    {
        let outcomes: Vec<(String, Result<SignalStats, SkipReason>)> = series_by_name
            .into_iter()
            .filter_map(|(name, series)| {
                let name: &str = name.as_ref();
                if self.is_excluded(name) {
                    debug!("Not summarizing excluded key '{}'", name);
                    return None;
                }
                Some((name.to_string(), self.summarize_signal(series)))
            })
            .collect();

        let mut aggregation = Aggregation::default();

        for (signal, outcome) in outcomes {
            match outcome {
                Ok(stats) => {
                    aggregation
                        .report
                        .insert_stats(&signal, &stats, self.options.emit_count);
                }
                Err(reason) => {
                    warn!(
                        "Could not compute metrics for reward key '{}': {}",
                        signal, reason
                    );
                    aggregation.skipped.push(SkippedSignal { signal, reason });
                }
            }
        }

        debug!(
            "Aggregated {} signals, skipped {}",
            aggregation.report.signals().len(),
            aggregation.skipped.len()
        );

        aggregation
    }

    /// Summarize a single series.
    pub fn summarize_signal(&self, series: &[RawObservation]) -> Result<SignalStats, SkipReason> {
        let normalized = normalize_series(series)?;
        if normalized.dropped() > 0 {
            debug!("Dropped {} non-finite values", normalized.dropped());
        }
        Ok(SignalStats::compute(&normalized, self.options.std_mode))
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.options.excluded_keys.iter().any(|key| key == name)
    }
}

/// Aggregate with default options.
pub fn aggregate<'a, I, K>(series_by_name: I) -> Aggregation
where
    I: IntoIterator<Item = (K, &'a SignalSeries)>,
    K: AsRef<str>,
{
    MetricsAggregator::default().aggregate(series_by_name)
}

/// Aggregate one recorded batch into its report entry.
pub fn summarize_batch(aggregator: &MetricsAggregator, batch: &RecordedBatch) -> BatchReport {
    let Aggregation { report, skipped } = aggregator.aggregate(&batch.series);

    BatchReport {
        name: batch.name.clone(),
        samples: batch.samples,
        mean_score: batch.mean_score(),
        metrics: report,
        skipped,
    }
}

impl SignalStats {
    /// Compute statistics over a normalized (non-empty, finite) series.
    ///
    /// Every emitted statistic is finite. A sample std that exceeds
    /// `f64::MAX` is left out.
    pub fn compute(series: &NormalizedSeries, std_mode: StdMode) -> Self {
        let values = series.values();
        let count = values.len();

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let (mut mean, mut std) = moments(values, 1.0, std_mode);
        if !mean.is_finite() || std.is_some_and(|s| !s.is_finite()) {
            // Sums overflowed; redo them on values scaled into [-1, 1]
            let scale = min.abs().max(max.abs());
            (mean, std) = moments(values, scale, std_mode);
        }

        Self {
            count,
            // Rounding can push the mean a hair outside [min, max]
            mean: mean.clamp(min, max),
            max,
            min,
            std: std.filter(|s| s.is_finite()),
        }
    }
}

/// Mean and std of `values / scale`, multiplied back by `scale`.
fn moments(values: &[f64], scale: f64, std_mode: StdMode) -> (f64, Option<f64>) {
    let count = values.len();
    let n = count as f64;

    let mean = values.iter().map(|v| v / scale).sum::<f64>() / n;

    let std = if count > 1 {
        let divisor = match std_mode {
            StdMode::Population => n,
            StdMode::Sample => n - 1.0,
        };
        let squared: f64 = values.iter().map(|v| (v / scale - mean).powi(2)).sum();
        Some((squared / divisor).sqrt() * scale)
    } else {
        None
    };

    (mean * scale, std)
}

/// Group a flat report into signal -> statistic -> value.
pub fn group_by_signal(report: &MetricsReport) -> BTreeMap<String, BTreeMap<MetricStat, MetricValue>> {
    let mut grouped: BTreeMap<String, BTreeMap<MetricStat, MetricValue>> = BTreeMap::new();

    for (key, value) in report.iter() {
        if let Some((signal, stat)) = split_metric_key(key) {
            grouped
                .entry(signal.to_string())
                .or_default()
                .insert(stat, *value);
        }
    }

    grouped
}

/// Count how often each signal was skipped across batches.
pub fn skip_counts(batches: &[BatchReport]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for skipped in batches.iter().flat_map(|b| &b.skipped) {
        *counts.entry(skipped.signal.clone()).or_default() += 1;
    }

    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    counts
}
