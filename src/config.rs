//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.reward-metrics.toml` files.

use crate::collector::SCORE_KEY;
use crate::models::StdMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".reward-metrics.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Aggregation settings.
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Batch discovery settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report output file. Printed to stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Number of batch files loaded concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: None,
            verbose: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Aggregator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Reward keys that are never summarized.
    #[serde(default = "default_excluded_keys")]
    pub excluded_keys: Vec<String>,

    /// Emit `reward/<signal>/count`.
    #[serde(default = "default_true")]
    pub emit_count: bool,

    /// Standard deviation estimator (`population` or `sample`).
    #[serde(default)]
    pub std: StdMode,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            excluded_keys: default_excluded_keys(),
            emit_count: true,
            std: StdMode::default(),
        }
    }
}

fn default_excluded_keys() -> Vec<String> {
    vec![SCORE_KEY.to_string()]
}

/// Batch file discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// File extensions treated as batch files.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory or file names to skip.
    #[serde(default = "default_excludes")]
    pub excludes: Vec<String>,

    /// Maximum batch files to load.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Maximum batch file size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            excludes: default_excludes(),
            max_files: default_max_files(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["json", "jsonl"].into_iter().map(String::from).collect()
}

fn default_excludes() -> Vec<String> {
    vec![".git", "target", "node_modules", "__pycache__", ".venv", "venv"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_files() -> usize {
    1000
}

fn default_max_file_size() -> u64 {
    64 * 1024 * 1024 // 64MB
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// List skipped signals with their reasons.
    #[serde(default = "default_true")]
    pub include_skipped: bool,

    /// Decimal places for float metrics in text reports.
    #[serde(default = "default_precision")]
    pub precision: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_skipped: true,
            precision: default_precision(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_precision() -> usize {
    4
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load configuration from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }

        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }

        if let Some(ref keys) = args.exclude_key {
            self.aggregation.excluded_keys = keys.clone();
        }

        if args.no_count {
            self.aggregation.emit_count = false;
        }

        if let Some(std) = args.std {
            self.aggregation.std = std.into();
        }

        if let Some(max_files) = args.max_files {
            self.batch.max_files = max_files;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
