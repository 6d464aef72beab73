//! Reward output collection.
//!
//! Scoring functions return either a bare reward or a map holding the
//! required `score` plus arbitrary sub-reward entries. The collector gathers
//! those entries across a batch into one series per key, ready for the
//! aggregator.

use crate::models::{RawObservation, SeriesByName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Key of the primary training signal in a detailed reward output.
pub const SCORE_KEY: &str = "score";

/// Errors raised when a reward output breaks the producer contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("reward output is missing a numeric \"score\" entry")]
    MissingScore,

    #[error("reward output must be a number or an object, got {found}")]
    UnsupportedOutput { found: String },
}

/// The fixed parameter set passed to a scoring function for one sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    /// Dataset or source identifier.
    pub data_source: String,
    /// Generated solution text.
    pub solution_str: String,
    /// Expected answer.
    pub ground_truth: String,
    /// Optional auxiliary information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<Value>,
    /// Extra keyword parameters configured for the function.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub kwargs: Map<String, Value>,
}

/// What a scoring function returns for one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum RewardOutput {
    /// A bare reward; contributes no sub-reward signals.
    Scalar(f64),
    /// The training score plus diagnostic sub-rewards.
    Detailed {
        score: f64,
        extras: BTreeMap<String, RawObservation>,
    },
}

impl RewardOutput {
    /// Build a detailed output from `(key, value)` pairs.
    pub fn detailed<I, K, V>(score: f64, extras: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RawObservation>,
    {
        RewardOutput::Detailed {
            score,
            extras: extras
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The primary training score.
    pub fn score(&self) -> f64 {
        match self {
            RewardOutput::Scalar(score) => *score,
            RewardOutput::Detailed { score, .. } => *score,
        }
    }

    /// Parse a recorded reward output.
    pub fn from_json(value: Value) -> Result<Self, CollectError> {
        match value {
            Value::Object(mut map) => {
                let score = map
                    .remove(SCORE_KEY)
                    .map(RawObservation::from)
                    .and_then(|obs| obs.as_f64())
                    .ok_or(CollectError::MissingScore)?;

                let extras = map
                    .into_iter()
                    .map(|(key, value)| (key, RawObservation::from(value)))
                    .collect();

                Ok(RewardOutput::Detailed { score, extras })
            }
            other => match RawObservation::from(other) {
                RawObservation::Scalar(score) => Ok(RewardOutput::Scalar(score)),
                obs => Err(CollectError::UnsupportedOutput {
                    found: obs.kind().to_string(),
                }),
            },
        }
    }
}

impl From<f64> for RewardOutput {
    fn from(score: f64) -> Self {
        RewardOutput::Scalar(score)
    }
}

/// A user-supplied reward function.
pub trait ScoringFunction: Send + Sync {
    fn score(&self, request: &ScoringRequest) -> RewardOutput;
}

impl<F> ScoringFunction for F
where
    F: Fn(&ScoringRequest) -> RewardOutput + Send + Sync,
{
    fn score(&self, request: &ScoringRequest) -> RewardOutput {
        self(request)
    }
}

/// Accumulates per-sample reward outputs into signal series.
#[derive(Debug, Clone, Default)]
pub struct RewardCollector {
    scores: Vec<f64>,
    series: SeriesByName,
}

impl RewardCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one sample's output.
    ///
    /// Every extra entry is appended to the series of its key; `score` never
    /// becomes a series. Keys a sample does not produce leave their series
    /// shorter than the batch.
    pub fn push(&mut self, output: RewardOutput) {
        match output {
            RewardOutput::Scalar(score) => self.scores.push(score),
            RewardOutput::Detailed { score, extras } => {
                self.scores.push(score);
                for (key, value) in extras {
                    if key == SCORE_KEY {
                        continue;
                    }
                    self.series.entry(key).or_default().push(value);
                }
            }
        }
    }

    /// Parse and record one sample's recorded JSON output.
    pub fn push_json(&mut self, value: Value) -> Result<(), CollectError> {
        let output = RewardOutput::from_json(value)?;
        self.push(output);
        Ok(())
    }

    /// Number of samples recorded.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Primary scores in sample order.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// Mean of the finite primary scores.
    pub fn mean_score(&self) -> Option<f64> {
        finite_mean(&self.scores)
    }

    pub fn series(&self) -> &SeriesByName {
        &self.series
    }

    pub fn into_series(self) -> SeriesByName {
        self.series
    }

    pub fn into_parts(self) -> (Vec<f64>, SeriesByName) {
        (self.scores, self.series)
    }
}

/// Mean of the finite values, if any.
pub(crate) fn finite_mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        None
    } else {
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

/// Score a batch of samples and collect the outputs.
pub fn score_batch<S>(function: &S, requests: &[ScoringRequest]) -> RewardCollector
where
    S: ScoringFunction + ?Sized,
{
    let mut collector = RewardCollector::new();

    for request in requests {
        collector.push(function.score(request));
    }

    debug!(
        "Scored {} samples into {} signals",
        collector.len(),
        collector.series().len()
    );

    collector
}
