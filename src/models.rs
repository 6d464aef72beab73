//! Data models for reward metrics aggregation.
//!
//! This module contains the core data structures shared by the collector,
//! the aggregator and the report generator: raw per-sample observations,
//! the flat metrics report, per-signal statistics and skip reasons.

use chrono::{DateTime, Utc};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Namespace prefix shared by every emitted metric.
pub const METRIC_NAMESPACE: &str = "reward";

/// A single per-sample value attached to a named signal.
///
/// Scoring functions may attach anything to a sub-reward key. The variant
/// decides how the aggregator flattens a series, so shape probing happens
/// once at construction time instead of during aggregation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawObservation {
    /// A single number. May be NaN or infinite.
    Scalar(f64),
    /// A (possibly nested) sequence of observations.
    Vector(Vec<RawObservation>),
    /// A tensor-like multi-dimensional numeric buffer.
    Buffer(ArrayD<f64>),
    /// Any non-numeric value (strings, booleans, nulls, objects).
    Other(Value),
}

impl RawObservation {
    /// Build a tensor-like observation from a shape and row-major data.
    ///
    /// Returns `None` when the data length does not match the shape.
    pub fn buffer(shape: &[usize], data: Vec<f64>) -> Option<Self> {
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .ok()
            .map(Self::Buffer)
    }

    /// Short name of the observation's kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            RawObservation::Scalar(_) => "number",
            RawObservation::Vector(_) => "sequence",
            RawObservation::Buffer(_) => "tensor",
            RawObservation::Other(value) => match value {
                Value::Null => "null",
                Value::Bool(_) => "boolean",
                Value::Number(_) => "number",
                Value::String(_) => "string",
                Value::Array(_) => "array",
                Value::Object(_) => "object",
            },
        }
    }

    /// Returns the numeric value if this is a scalar.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawObservation::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert back to JSON. Non-finite scalars become the strings
    /// `"NaN"`, `"Infinity"` and `"-Infinity"`.
    pub fn to_json(&self) -> Value {
        match self {
            RawObservation::Scalar(v) => scalar_to_json(*v),
            RawObservation::Vector(items) => {
                Value::Array(items.iter().map(RawObservation::to_json).collect())
            }
            RawObservation::Buffer(array) => {
                let mut map = Map::new();
                map.insert(
                    "shape".to_string(),
                    Value::Array(array.shape().iter().map(|d| Value::from(*d)).collect()),
                );
                map.insert(
                    "data".to_string(),
                    Value::Array(array.iter().map(|v| scalar_to_json(*v)).collect()),
                );
                Value::Object(map)
            }
            RawObservation::Other(value) => value.clone(),
        }
    }
}

fn scalar_to_json(v: f64) -> Value {
    match serde_json::Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::String("NaN".to_string()),
        None if v > 0.0 => Value::String("Infinity".to_string()),
        None => Value::String("-Infinity".to_string()),
    }
}

/// Parse the textual spellings of IEEE special values.
///
/// JSON has no literal for NaN or infinity, so recorded batches carry them
/// as strings.
pub fn parse_special_float(s: &str) -> Option<f64> {
    match s.trim().to_ascii_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

/// Recognize `{"shape": [..], "data": [..]}` objects as tensors.
fn buffer_from_object(map: &Map<String, Value>) -> Option<ArrayD<f64>> {
    if map.len() != 2 {
        return None;
    }

    let shape = map
        .get("shape")?
        .as_array()?
        .iter()
        .map(|d| d.as_u64().and_then(|d| usize::try_from(d).ok()))
        .collect::<Option<Vec<usize>>>()?;

    let data = map
        .get("data")?
        .as_array()?
        .iter()
        .map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_special_float(s),
            _ => None,
        })
        .collect::<Option<Vec<f64>>>()?;

    ArrayD::from_shape_vec(IxDyn(&shape), data).ok()
}

impl From<Value> for RawObservation {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(v) => RawObservation::Scalar(v),
                None => RawObservation::Other(Value::Number(n)),
            },
            Value::String(s) => match parse_special_float(&s) {
                Some(v) => RawObservation::Scalar(v),
                None => RawObservation::Other(Value::String(s)),
            },
            Value::Array(items) => {
                RawObservation::Vector(items.into_iter().map(RawObservation::from).collect())
            }
            Value::Object(map) => match buffer_from_object(&map) {
                Some(array) => RawObservation::Buffer(array),
                None => RawObservation::Other(Value::Object(map)),
            },
            other => RawObservation::Other(other),
        }
    }
}

impl From<f64> for RawObservation {
    fn from(value: f64) -> Self {
        RawObservation::Scalar(value)
    }
}

impl From<i64> for RawObservation {
    fn from(value: i64) -> Self {
        RawObservation::Scalar(value as f64)
    }
}

impl From<Vec<f64>> for RawObservation {
    fn from(values: Vec<f64>) -> Self {
        RawObservation::Vector(values.into_iter().map(RawObservation::Scalar).collect())
    }
}

impl From<ArrayD<f64>> for RawObservation {
    fn from(array: ArrayD<f64>) -> Self {
        RawObservation::Buffer(array)
    }
}

impl From<&str> for RawObservation {
    fn from(value: &str) -> Self {
        RawObservation::from(Value::String(value.to_string()))
    }
}

impl From<bool> for RawObservation {
    fn from(value: bool) -> Self {
        RawObservation::Other(Value::Bool(value))
    }
}

impl Serialize for RawObservation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RawObservation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(RawObservation::from)
    }
}

/// Batch-ordered observations of one signal.
pub type SignalSeries = Vec<RawObservation>;

/// Signal name to series, as produced by the reward collector.
pub type SeriesByName = BTreeMap<String, SignalSeries>;

/// Standard deviation estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdMode {
    /// Divide by `n` (what numpy's `std` reports by default).
    #[default]
    Population,
    /// Divide by `n - 1`.
    Sample,
}

/// A statistic emitted per signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStat {
    Mean,
    Max,
    Min,
    Std,
    Count,
}

impl MetricStat {
    /// All statistics in display order.
    pub const ALL: [MetricStat; 5] = [
        MetricStat::Mean,
        MetricStat::Max,
        MetricStat::Min,
        MetricStat::Std,
        MetricStat::Count,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricStat::Mean => "mean",
            MetricStat::Max => "max",
            MetricStat::Min => "min",
            MetricStat::Std => "std",
            MetricStat::Count => "count",
        }
    }

    /// Parse a metric key suffix.
    pub fn from_suffix(s: &str) -> Option<Self> {
        MetricStat::ALL.into_iter().find(|stat| stat.as_str() == s)
    }
}

impl fmt::Display for MetricStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the `reward/<signal>/<stat>` key for a metric.
pub fn metric_key(signal: &str, stat: MetricStat) -> String {
    format!("{}/{}/{}", METRIC_NAMESPACE, signal, stat.as_str())
}

/// Split a metric key back into signal name and statistic.
///
/// Signal names may themselves contain `/`, so the statistic is taken from
/// the last segment.
pub fn split_metric_key(key: &str) -> Option<(&str, MetricStat)> {
    let rest = key.strip_prefix(METRIC_NAMESPACE)?.strip_prefix('/')?;
    let (signal, stat) = rest.rsplit_once('/')?;
    Some((signal, MetricStat::from_suffix(stat)?))
}

/// A scalar metric value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Integer counts are reported as-is, never averaged.
    Count(u64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::Count(n) => *n as f64,
            MetricValue::Float(v) => *v,
        }
    }

    /// Format with a fixed number of decimals; counts stay integral.
    pub fn format(&self, precision: usize) -> String {
        match self {
            MetricValue::Count(n) => n.to_string(),
            MetricValue::Float(v) => format!("{:.*}", precision, v),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Count(n) => write!(f, "{}", n),
            MetricValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Summary statistics of one signal's finite values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    /// Number of finite values retained.
    pub count: usize,
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    /// Absent for a single value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
}

/// Flat mapping of `reward/<signal>/<stat>` to scalar values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsReport {
    metrics: BTreeMap<String, MetricValue>,
}

impl MetricsReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the statistics of one signal.
    pub fn insert_stats(&mut self, signal: &str, stats: &SignalStats, emit_count: bool) {
        self.insert(signal, MetricStat::Mean, MetricValue::Float(stats.mean));
        self.insert(signal, MetricStat::Max, MetricValue::Float(stats.max));
        self.insert(signal, MetricStat::Min, MetricValue::Float(stats.min));

        if let Some(std) = stats.std {
            self.insert(signal, MetricStat::Std, MetricValue::Float(std));
        }

        if emit_count {
            self.insert(
                signal,
                MetricStat::Count,
                MetricValue::Count(stats.count as u64),
            );
        }
    }

    pub fn insert(&mut self, signal: &str, stat: MetricStat, value: MetricValue) {
        self.metrics.insert(metric_key(signal, stat), value);
    }

    pub fn get(&self, key: &str) -> Option<MetricValue> {
        self.metrics.get(key).copied()
    }

    /// Look up a metric as a float.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).map(|v| v.as_f64())
    }

    /// Look up one statistic of one signal.
    pub fn stat(&self, signal: &str, stat: MetricStat) -> Option<MetricValue> {
        self.get(&metric_key(signal, stat))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.metrics.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetricValue)> {
        self.metrics.iter()
    }

    /// Keys emitted for one signal.
    pub fn keys_for_signal<'a>(&'a self, signal: &'a str) -> impl Iterator<Item = &'a String> {
        self.metrics
            .keys()
            .filter(move |key| matches!(split_metric_key(key), Some((s, _)) if s == signal))
    }

    /// Names of all signals present in the report.
    pub fn signals(&self) -> Vec<String> {
        let signals: BTreeSet<&str> = self
            .metrics
            .keys()
            .filter_map(|key| split_metric_key(key).map(|(signal, _)| signal))
            .collect();
        signals.into_iter().map(String::from).collect()
    }

    /// Merge into a caller-owned metrics dictionary, overwriting clashes.
    pub fn merge_into(&self, target: &mut BTreeMap<String, f64>) {
        for (key, value) in &self.metrics {
            target.insert(key.clone(), value.as_f64());
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, MetricValue> {
        self.metrics
    }
}

/// Why a signal produced no metrics.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("series is empty")]
    EmptySeries,

    #[error("non-numeric {found} value at position {index}")]
    NonNumeric { index: usize, found: String },

    #[error("sample {index} is a {found} but the series started with a {expected}")]
    ShapeMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("no finite values ({dropped} NaN or infinite dropped)")]
    NoFiniteValues { dropped: usize },
}

/// A signal that was left out of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSignal {
    pub signal: String,
    pub reason: SkipReason,
}

impl fmt::Display for SkippedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.signal, self.reason)
    }
}

/// Result of one aggregation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub report: MetricsReport,
    pub skipped: Vec<SkippedSignal>,
}

impl Aggregation {
    /// True when every signal produced metrics.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Aggregated metrics for one recorded batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Batch name (file path relative to the input root).
    pub name: String,
    /// Number of scored samples.
    pub samples: usize,
    /// Mean of the primary training scores, when the batch carries them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_score: Option<f64>,
    pub metrics: MetricsReport,
    pub skipped: Vec<SkippedSignal>,
}

/// Metadata about a metrics run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Input path the batches were read from.
    pub source: String,
    pub generated_at: DateTime<Utc>,
    /// Number of batches aggregated.
    pub batches: usize,
    /// Number of batch files that could not be loaded.
    pub batches_failed: usize,
    /// Total scored samples across all batches.
    pub samples: usize,
    /// Signals that produced metrics, summed over batches.
    pub signals_reported: usize,
    /// Signals skipped, summed over batches.
    pub signals_skipped: usize,
    pub duration_seconds: f64,
}

/// The complete metrics report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub batches: Vec<BatchReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_observation_from_json() {
        assert_eq!(RawObservation::from(json!(0.5)), RawObservation::Scalar(0.5));
        assert_eq!(RawObservation::from(json!(3)), RawObservation::Scalar(3.0));
        assert_eq!(
            RawObservation::from(json!([0.1, 0.2])),
            RawObservation::from(vec![0.1, 0.2])
        );
        assert_eq!(
            RawObservation::from(json!("hello")),
            RawObservation::Other(json!("hello"))
        );
        assert_eq!(
            RawObservation::from(json!(true)),
            RawObservation::Other(json!(true))
        );
    }

    #[test]
    fn test_special_float_strings() {
        assert!(RawObservation::from(json!("NaN"))
            .as_f64()
            .is_some_and(f64::is_nan));
        assert_eq!(
            RawObservation::from(json!("Infinity")).as_f64(),
            Some(f64::INFINITY)
        );
        assert_eq!(
            RawObservation::from(json!("-inf")).as_f64(),
            Some(f64::NEG_INFINITY)
        );
        assert_eq!(parse_special_float("infinite"), None);
    }

    #[test]
    fn test_tensor_object() {
        let obs = RawObservation::from(json!({"shape": [2, 2], "data": [1.0, 2.0, 3.0, 4.0]}));
        match obs {
            RawObservation::Buffer(ref array) => {
                assert_eq!(array.shape(), &[2, 2]);
                assert_eq!(array.iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0, 4.0]);
            }
            other => panic!("expected tensor, got {:?}", other),
        }

        // Mismatched shape stays opaque
        let bad = RawObservation::from(json!({"shape": [3], "data": [1.0, 2.0]}));
        assert_eq!(bad.kind(), "object");
    }

    #[test]
    fn test_observation_json_roundtrip_keeps_specials() {
        let obs = RawObservation::from(vec![0.5, f64::INFINITY]);
        assert_eq!(obs.to_json(), json!([0.5, "Infinity"]));

        let buffer = RawObservation::buffer(&[2], vec![1.0, 2.0]).unwrap();
        let back: RawObservation = serde_json::from_value(buffer.to_json()).unwrap();
        assert_eq!(back, buffer);
    }

    #[test]
    fn test_metric_key_split() {
        assert_eq!(metric_key("fluency", MetricStat::Mean), "reward/fluency/mean");
        assert_eq!(
            split_metric_key("reward/judge/helpful/std"),
            Some(("judge/helpful", MetricStat::Std))
        );
        assert_eq!(split_metric_key("critic/score/mean"), None);
        assert_eq!(split_metric_key("reward/fluency/median"), None);
    }

    #[test]
    fn test_report_insert_stats() {
        let stats = SignalStats {
            count: 1,
            mean: 0.42,
            max: 0.42,
            min: 0.42,
            std: None,
        };

        let mut report = MetricsReport::new();
        report.insert_stats("single", &stats, true);

        assert_eq!(report.len(), 4);
        assert_eq!(report.get("reward/single/count"), Some(MetricValue::Count(1)));
        assert!(!report.contains_key("reward/single/std"));
        assert_eq!(report.signals(), vec!["single".to_string()]);
    }

    #[test]
    fn test_report_serializes_flat() {
        let mut report = MetricsReport::new();
        report.insert("a", MetricStat::Mean, MetricValue::Float(0.5));
        report.insert("a", MetricStat::Count, MetricValue::Count(2));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json, json!({"reward/a/count": 2, "reward/a/mean": 0.5}));

        let back: MetricsReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_merge_into() {
        let mut report = MetricsReport::new();
        report.insert("a", MetricStat::Max, MetricValue::Float(0.9));

        let mut step_metrics = BTreeMap::new();
        step_metrics.insert("actor/loss".to_string(), 0.1);
        report.merge_into(&mut step_metrics);

        assert_eq!(step_metrics.len(), 2);
        assert_eq!(step_metrics.get("reward/a/max"), Some(&0.9));
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::NonNumeric {
            index: 0,
            found: "string".to_string(),
        };
        assert_eq!(reason.to_string(), "non-numeric string value at position 0");
    }
}
