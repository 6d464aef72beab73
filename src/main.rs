//! reward-metrics - summarize sub-reward signals from RL scoring batches
//!
//! A CLI tool that reads recorded reward outputs and reports summary
//! statistics for every sub-reward signal.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (unreadable input, bad config, etc.)
//!   2 - Signals were skipped and --fail-on-skip was set

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use reward_metrics::batch::{self, BatchFile, BatchScanner, ScanConfig};
use reward_metrics::cli::{Args, OutputFormat};
use reward_metrics::config::{Config, CONFIG_FILE_NAME};
use reward_metrics::models::{BatchReport, Report, ReportMetadata};
use reward_metrics::{report, summarize_batch, MetricsAggregator};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("reward-metrics v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Aggregation failed: {}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .reward-metrics.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize excluded keys, std mode, batch discovery, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr so stdout carries only the report.
fn init_logging(args: &Args) {
    let level = if !args.quiet && !args.verbose && config_requests_verbose(args) {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Whether the config file sets `verbose = true`. Load errors are reported later.
fn config_requests_verbose(args: &Args) -> bool {
    let config = match args.config {
        Some(ref path) => Config::load(path).ok(),
        None => Config::load_default().ok().flatten(),
    };
    config.is_some_and(|c| c.general.verbose)
}

/// Run the complete aggregation workflow. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let input = args.input_path();

    // Step 1: Discover batch files
    let scan_config = ScanConfig::from(&config.batch);
    let scanner = BatchScanner::new(input.clone(), scan_config);
    let files = scanner.scan()?;

    if files.is_empty() {
        warn!("No batch files found under {}", input.display());
    }
    status(&args, &format!("📥 Loading {} batch file(s)...", files.len()));

    // Step 2: Load batches concurrently
    let progress = create_progress_bar(show_progress(&args, &config), files.len());
    let results = batch::load_batches(&files, config.general.concurrency, Some(&progress)).await;
    progress.finish_and_clear();

    // Step 3: Aggregate each batch
    let aggregator = MetricsAggregator::new((&config.aggregation).into());
    let mut batches: Vec<BatchReport> = Vec::new();
    let mut batches_failed = 0;

    for (file, result) in files.iter().zip(results) {
        match result {
            Ok(recorded) => batches.push(summarize_batch(&aggregator, &recorded)),
            Err(e) => {
                batches_failed += 1;
                log_failed_batch(file, &e);
            }
        }
    }

    // Step 4: Build the report
    let metadata = ReportMetadata {
        source: input.display().to_string(),
        generated_at: Utc::now(),
        batches: batches.len(),
        batches_failed,
        samples: batches.iter().map(|b| b.samples).sum(),
        signals_reported: batches.iter().map(|b| b.metrics.signals().len()).sum(),
        signals_skipped: batches.iter().map(|b| b.skipped.len()).sum(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let report = Report { metadata, batches };

    // Step 5: Render and write the report
    let output = match args.format {
        OutputFormat::Console => report::generate_console_report(&report, &config.report),
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
        OutputFormat::Json => report::generate_json_report(&report)?,
    };

    match config.general.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path))?;
            status(&args, &format!("\n✅ Report saved to: {}", path));
        }
        None => print!("{}", output),
    }

    print_summary(&args, &report);

    if batches_failed > 0 && report.batches.is_empty() {
        anyhow::bail!("All {} batch file(s) failed to load", batches_failed);
    }

    // Check --fail-on-skip
    if args.fail_on_skip && report.metadata.signals_skipped > 0 {
        eprintln!(
            "\n⛔ {} signal(s) were skipped. Failing (exit code 2).",
            report.metadata.signals_skipped
        );
        return Ok(2);
    }

    Ok(0)
}

/// Whether to draw the loading progress bar.
///
/// A console report printed to stdout shares the terminal with the bar.
fn show_progress(args: &Args, config: &Config) -> bool {
    let console_on_stdout =
        args.format == OutputFormat::Console && config.general.output.is_none();
    !args.quiet && !console_on_stdout
}

/// Create the batch loading progress bar.
fn create_progress_bar(visible: bool, len: usize) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn log_failed_batch(file: &BatchFile, e: &batch::BatchError) {
    warn!("Skipping batch {}: {}", file.name, e);
}

/// Print a status line to stderr unless quiet.
fn status(args: &Args, message: &str) {
    if !args.quiet {
        eprintln!("{}", message);
    }
}

/// Print the run summary to stderr.
fn print_summary(args: &Args, report: &Report) {
    if args.quiet {
        return;
    }

    let metadata = &report.metadata;
    eprintln!("\n📊 Summary:");
    eprintln!(
        "   Batches: {} ({} failed)",
        metadata.batches, metadata.batches_failed
    );
    eprintln!("   Samples: {}", metadata.samples);
    eprintln!(
        "   Signals: {} reported | {} skipped",
        metadata.signals_reported, metadata.signals_skipped
    );
    eprintln!("   Duration: {:.1}s", metadata.duration_seconds);
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
