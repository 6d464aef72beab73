//! Analysis modules.
//!
//! Series normalization and the metrics aggregator built on it.

pub mod aggregator;
pub mod normalize;

pub use aggregator::*;
pub use normalize::{normalize_series, NormalizedSeries};
