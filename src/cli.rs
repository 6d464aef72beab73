//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::StdMode;
use clap::Parser;
use std::path::PathBuf;

/// reward-metrics - summarize sub-reward signals from RL scoring batches
///
/// Reads recorded per-sample reward outputs (JSON or JSON Lines) and reports
/// mean, max, min, std and count for every sub-reward signal under the
/// `reward/` namespace. Malformed signals are skipped, never fatal.
///
/// Examples:
///   reward-metrics --input rollouts/step_0100.json
///   reward-metrics --input rollouts/ --format markdown --output report.md
///   reward-metrics --input rollouts/ --format json --std sample
///   reward-metrics --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Batch file or directory of batch files to aggregate
    #[arg(short, long, value_name = "PATH", required_unless_present = "init_config")]
    pub input: Option<PathBuf>,

    /// Output file path for the report
    ///
    /// If not specified, the report is printed to stdout.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .reward-metrics.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format (console, markdown, json)
    #[arg(long, default_value = "console", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Number of batch files loaded concurrently
    #[arg(long, value_name = "NUM", env = "REWARD_METRICS_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Reward keys never summarized (comma-separated)
    ///
    /// Replaces the configured list. Example: --exclude-key score,acc
    #[arg(long, value_name = "KEYS", value_delimiter = ',')]
    pub exclude_key: Option<Vec<String>>,

    /// Do not emit the per-signal count metric
    #[arg(long)]
    pub no_count: bool,

    /// Standard deviation estimator
    #[arg(long, value_name = "MODE")]
    pub std: Option<StdArg>,

    /// Maximum number of batch files to load from a directory
    #[arg(long, value_name = "COUNT")]
    pub max_files: Option<usize>,

    /// Exit with code 2 if any signal was skipped
    ///
    /// Useful in CI to catch scoring functions emitting non-numeric sub-rewards.
    #[arg(long)]
    pub fail_on_skip: bool,

    /// Generate a default .reward-metrics.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text table (default)
    #[default]
    Console,
    /// Markdown format
    Markdown,
    /// JSON format
    Json,
}

/// Standard deviation estimator for --std.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StdArg {
    Population,
    Sample,
}

impl From<StdArg> for StdMode {
    fn from(arg: StdArg) -> Self {
        match arg {
            StdArg::Population => StdMode::Population,
            StdArg::Sample => StdMode::Sample,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.input {
            Some(ref input) if !input.exists() => {
                return Err(format!("Input path does not exist: {}", input.display()));
            }
            None => return Err("An --input path is required".to_string()),
            _ => {}
        }

        // Validate concurrency
        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        // Validate max files
        if self.max_files == Some(0) {
            return Err("Max files must be at least 1".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref keys) = self.exclude_key {
            if keys.iter().any(|k| k.trim().is_empty()) {
                return Err("Excluded keys must not be empty".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Get the input path (validated to be present first).
    pub fn input_path(&self) -> PathBuf {
        self.input.clone().unwrap_or_default()
    }
}
