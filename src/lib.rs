//! reward-metrics - summary statistics for RL sub-reward signals
//!
//! Scoring functions used in reinforcement-learning training return a primary
//! `score` plus arbitrary diagnostic sub-rewards. This crate collects those
//! sub-rewards across a batch and reduces every signal to
//! `reward/<signal>/{mean,max,min,std,count}` metrics. Signals that cannot be
//! summarized are skipped with a logged reason.
//!
//! ```
//! use reward_metrics::{aggregate, RawObservation, SeriesByName};
//!
//! let mut batch = SeriesByName::new();
//! batch.insert(
//!     "fluency".to_string(),
//!     vec![RawObservation::from(0.7), RawObservation::from(0.9)],
//! );
//!
//! let aggregation = aggregate(&batch);
//! assert_eq!(aggregation.report.get_f64("reward/fluency/max"), Some(0.9));
//! ```

pub mod analysis;
pub mod batch;
pub mod cli;
pub mod collector;
pub mod config;
pub mod models;
pub mod report;

pub use analysis::{aggregate, summarize_batch, AggregatorOptions, MetricsAggregator};
pub use batch::{BatchError, BatchScanner, RecordedBatch, ScanConfig};
pub use collector::{
    score_batch, CollectError, RewardCollector, RewardOutput, ScoringFunction, ScoringRequest,
};
pub use config::Config;
pub use models::{
    Aggregation, MetricStat, MetricValue, MetricsReport, RawObservation, SeriesByName,
    SignalSeries, SignalStats, SkipReason, SkippedSignal, StdMode,
};
