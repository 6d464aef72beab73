//! Batch file discovery and loading.
//!
//! A batch file records one scoring batch. Three layouts are accepted:
//! a JSON array of per-sample reward outputs, a JSON object mapping each
//! signal to its series, or JSON Lines with one reward output per line.

use crate::collector::{finite_mean, CollectError, RewardCollector, SCORE_KEY};
use crate::models::{RawObservation, SeriesByName};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Errors raised while discovering or parsing batch files.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("input path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to scan {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid JSON in {name}: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid JSON on line {line} of {name}: {source}")]
    JsonLine {
        name: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("sample {index} of {name}: {source}")]
    Sample {
        name: String,
        index: usize,
        #[source]
        source: CollectError,
    },

    #[error("{name} must hold an array of reward outputs or an object of signal series")]
    UnsupportedLayout { name: String },
}

/// Configuration for batch discovery.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include (e.g., ["json", "jsonl"])
    pub extensions: Vec<String>,
    /// Names to exclude (e.g., [".git", "target"])
    pub excludes: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size: u64,
    /// Maximum number of files to return
    pub max_files: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::from(&crate::config::BatchConfig::default())
    }
}

impl From<&crate::config::BatchConfig> for ScanConfig {
    fn from(config: &crate::config::BatchConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excludes: config.excludes.clone(),
            max_file_size: config.max_file_size,
            max_files: Some(config.max_files),
        }
    }
}

/// A discovered batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFile {
    /// Absolute or caller-relative path.
    pub path: PathBuf,
    /// Path relative to the scan root, used as the batch name.
    pub name: String,
    /// File size in bytes
    pub size: u64,
}

impl BatchFile {
    fn is_json_lines(&self) -> bool {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jsonl") || e.eq_ignore_ascii_case("ndjson"))
    }
}

/// Discovers batch files under an input path.
pub struct BatchScanner {
    config: ScanConfig,
    root: PathBuf,
}

impl BatchScanner {
    /// Create a new batch scanner.
    pub fn new(root: PathBuf, config: ScanConfig) -> Self {
        Self { config, root }
    }

    /// Scan for all matching batch files, sorted by name.
    ///
    /// A file root is returned as-is, whatever its extension.
    pub fn scan(&self) -> Result<Vec<BatchFile>, BatchError> {
        if !self.root.exists() {
            return Err(BatchError::NotFound(self.root.clone()));
        }

        if self.root.is_file() {
            let size = std::fs::metadata(&self.root)
                .map_err(|source| BatchError::Io {
                    path: self.root.clone(),
                    source,
                })?
                .len();
            let name = self
                .root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| self.root.display().to_string());

            return Ok(vec![BatchFile {
                path: self.root.clone(),
                name,
                size,
            }]);
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !self.is_excluded(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = entry.map_err(|source| BatchError::Walk {
                root: self.root.clone(),
                source,
            })?;

            if !entry.file_type().is_file() || !self.matches_extension(entry.path()) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    debug!("Cannot stat {}: {}", entry.path().display(), e);
                    continue;
                }
            };

            if size > self.config.max_file_size {
                warn!(
                    "Skipping {} ({} bytes exceeds the {} byte limit)",
                    entry.path().display(),
                    size,
                    self.config.max_file_size
                );
                continue;
            }

            let rel_path = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            files.push(BatchFile {
                path: entry.path().to_path_buf(),
                name: rel_path.to_string_lossy().to_string(),
                size,
            });

            if let Some(max) = self.config.max_files {
                if files.len() >= max {
                    debug!("Reached the limit of {} batch files", max);
                    break;
                }
            }
        }

        Ok(files)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.config
            .extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    /// Check if a name matches exclusion patterns.
    fn is_excluded(&self, name: &str) -> bool {
        // Hidden files
        if name.starts_with('.') {
            return true;
        }

        self.config.excludes.iter().any(|pattern| name == pattern)
    }
}

/// One recorded scoring batch, ready for aggregation.
#[derive(Debug, Clone, Default)]
pub struct RecordedBatch {
    pub name: String,
    /// Number of scored samples.
    pub samples: usize,
    /// Primary training scores, when recorded.
    pub scores: Vec<f64>,
    pub series: SeriesByName,
}

impl RecordedBatch {
    /// Mean of the finite primary scores.
    pub fn mean_score(&self) -> Option<f64> {
        finite_mean(&self.scores)
    }

    fn from_collector(name: &str, collector: RewardCollector) -> Self {
        let samples = collector.len();
        let (scores, series) = collector.into_parts();
        Self {
            name: name.to_string(),
            samples,
            scores,
            series,
        }
    }
}

/// Parse the contents of a batch file.
pub fn parse_batch(name: &str, content: &str, json_lines: bool) -> Result<RecordedBatch, BatchError> {
    if json_lines {
        return parse_json_lines(name, content);
    }

    let value: Value = serde_json::from_str(content).map_err(|source| BatchError::Json {
        name: name.to_string(),
        source,
    })?;

    match value {
        Value::Array(samples) => {
            let mut collector = RewardCollector::new();
            for (index, sample) in samples.into_iter().enumerate() {
                collector
                    .push_json(sample)
                    .map_err(|source| BatchError::Sample {
                        name: name.to_string(),
                        index,
                        source,
                    })?;
            }
            Ok(RecordedBatch::from_collector(name, collector))
        }
        Value::Object(map) => parse_series_map(name, map),
        _ => Err(BatchError::UnsupportedLayout {
            name: name.to_string(),
        }),
    }
}

/// Pre-collected layout: `{"signal": [obs, ...], ...}`.
fn parse_series_map(
    name: &str,
    map: serde_json::Map<String, Value>,
) -> Result<RecordedBatch, BatchError> {
    let mut series = SeriesByName::new();
    let mut scores = Vec::new();

    for (key, value) in map {
        let observations = match value {
            Value::Array(items) => items.into_iter().map(RawObservation::from).collect::<Vec<_>>(),
            _ => {
                return Err(BatchError::UnsupportedLayout {
                    name: name.to_string(),
                })
            }
        };

        if key == SCORE_KEY {
            scores = observations.iter().filter_map(RawObservation::as_f64).collect();
        } else {
            series.insert(key, observations);
        }
    }

    let samples = series
        .values()
        .map(Vec::len)
        .chain(std::iter::once(scores.len()))
        .max()
        .unwrap_or(0);

    Ok(RecordedBatch {
        name: name.to_string(),
        samples,
        scores,
        series,
    })
}

fn parse_json_lines(name: &str, content: &str) -> Result<RecordedBatch, BatchError> {
    let mut collector = RewardCollector::new();

    for (line_index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let value: Value = serde_json::from_str(line).map_err(|source| BatchError::JsonLine {
            name: name.to_string(),
            line: line_index + 1,
            source,
        })?;

        let index = collector.len();
        collector
            .push_json(value)
            .map_err(|source| BatchError::Sample {
                name: name.to_string(),
                index,
                source,
            })?;
    }

    Ok(RecordedBatch::from_collector(name, collector))
}

/// Read and parse one batch file.
pub async fn load_batch(file: &BatchFile) -> Result<RecordedBatch, BatchError> {
    let content = tokio::fs::read_to_string(&file.path)
        .await
        .map_err(|source| BatchError::Io {
            path: file.path.clone(),
            source,
        })?;

    let batch = parse_batch(&file.name, &content, file.is_json_lines())?;
    debug!(
        "Loaded {}: {} samples, {} signals",
        batch.name,
        batch.samples,
        batch.series.len()
    );
    Ok(batch)
}

/// Load batch files concurrently.
///
/// Results come back in the order of `files`. Each completed load advances
/// the progress bar if one is given.
pub async fn load_batches(
    files: &[BatchFile],
    concurrency: usize,
    progress: Option<&ProgressBar>,
) -> Vec<Result<RecordedBatch, BatchError>> {
    stream::iter(files)
        .map(|file| async move {
            let result = load_batch(file).await;
            if let Some(pb) = progress {
                pb.inc(1);
            }
            result
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
