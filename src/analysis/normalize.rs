//! Series normalization.
//!
//! Turns a series of raw observations into a flat sequence of finite
//! numbers, or explains why that is impossible.

use crate::models::{RawObservation, SkipReason};

/// The flat, all-finite projection of a signal series.
///
/// Never empty: construction fails with a [`SkipReason`] instead.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSeries {
    values: Vec<f64>,
    dropped: usize,
}

impl NormalizedSeries {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no values were retained.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of NaN or infinite values removed during sanitizing.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Normalize a series: flatten, type-check, then drop non-finite values.
pub fn normalize_series(series: &[RawObservation]) -> Result<NormalizedSeries, SkipReason> {
    let flat = flatten_series(series)?;
    let total = flat.len();
    let values = sanitize(flat);

    if values.is_empty() {
        return Err(SkipReason::NoFiniteValues { dropped: total });
    }

    Ok(NormalizedSeries {
        dropped: total - values.len(),
        values,
    })
}

/// Flatten a series to numbers.
///
/// The strategy is chosen from the first sample only:
/// - tensors are concatenated through their flat views,
/// - sequences are flattened by one level,
/// - anything else is read as a flat series of scalars.
pub fn flatten_series(series: &[RawObservation]) -> Result<Vec<f64>, SkipReason> {
    let first = series.first().ok_or(SkipReason::EmptySeries)?;

    match first {
        RawObservation::Buffer(_) => {
            let mut flat = Vec::new();
            for (index, sample) in series.iter().enumerate() {
                match sample {
                    RawObservation::Buffer(array) => flat.extend(array.iter().copied()),
                    other => return Err(shape_mismatch(index, first, other)),
                }
            }
            Ok(flat)
        }
        RawObservation::Vector(_) => {
            let mut flat = Vec::new();
            for (index, sample) in series.iter().enumerate() {
                match sample {
                    RawObservation::Vector(items) => {
                        for item in items {
                            flat.push(scalar_at(flat.len(), item)?);
                        }
                    }
                    other => return Err(shape_mismatch(index, first, other)),
                }
            }
            Ok(flat)
        }
        _ => series
            .iter()
            .enumerate()
            .map(|(index, sample)| scalar_at(index, sample))
            .collect(),
    }
}

/// Keep only finite values.
pub fn sanitize(mut values: Vec<f64>) -> Vec<f64> {
    values.retain(|v| v.is_finite());
    values
}

fn scalar_at(index: usize, observation: &RawObservation) -> Result<f64, SkipReason> {
    observation.as_f64().ok_or_else(|| SkipReason::NonNumeric {
        index,
        found: observation.kind().to_string(),
    })
}

fn shape_mismatch(index: usize, first: &RawObservation, found: &RawObservation) -> SkipReason {
    SkipReason::ShapeMismatch {
        index,
        expected: first.kind().to_string(),
        found: found.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalars(values: &[f64]) -> Vec<RawObservation> {
        values.iter().copied().map(RawObservation::Scalar).collect()
    }

    #[test]
    fn test_flatten_scalars() {
        let flat = flatten_series(&scalars(&[0.1, 0.2, 0.3])).unwrap();
        assert_eq!(flat, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_flatten_nested_one_level() {
        let series = vec![
            RawObservation::from(vec![0.1, 0.2]),
            RawObservation::from(vec![0.3]),
            RawObservation::from(Vec::<f64>::new()),
        ];
        assert_eq!(flatten_series(&series).unwrap(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_flatten_tensors() {
        let series = vec![
            RawObservation::buffer(&[2], vec![0.5, 0.6]).unwrap(),
            RawObservation::buffer(&[2, 1], vec![0.8, 0.9]).unwrap(),
            RawObservation::buffer(&[], vec![0.7]).unwrap(),
        ];
        assert_eq!(flatten_series(&series).unwrap(), vec![0.5, 0.6, 0.8, 0.9, 0.7]);
    }

    #[test]
    fn test_flatten_empty() {
        assert_eq!(flatten_series(&[]), Err(SkipReason::EmptySeries));
    }

    #[test]
    fn test_flatten_strings_rejected() {
        let series = vec![RawObservation::from("hello"), RawObservation::from("world")];
        assert_eq!(
            flatten_series(&series),
            Err(SkipReason::NonNumeric {
                index: 0,
                found: "string".to_string()
            })
        );
    }

    #[test]
    fn test_booleans_are_not_numbers() {
        let series = vec![RawObservation::from(true), RawObservation::from(false)];
        assert!(matches!(
            flatten_series(&series),
            Err(SkipReason::NonNumeric { .. })
        ));
    }

    #[test]
    fn test_mixed_shapes_decided_by_first_sample() {
        // Scalar first: a later list is not a scalar
        let series = vec![RawObservation::Scalar(0.1), RawObservation::from(vec![0.2])];
        assert!(matches!(
            flatten_series(&series),
            Err(SkipReason::NonNumeric { index: 1, .. })
        ));

        // List first: a later scalar breaks the shape
        let series = vec![RawObservation::from(vec![0.1]), RawObservation::Scalar(0.2)];
        assert_eq!(
            flatten_series(&series),
            Err(SkipReason::ShapeMismatch {
                index: 1,
                expected: "sequence".to_string(),
                found: "number".to_string()
            })
        );
    }

    #[test]
    fn test_deeper_nesting_is_non_numeric() {
        let series = vec![RawObservation::Vector(vec![RawObservation::from(vec![0.1])])];
        assert!(matches!(
            flatten_series(&series),
            Err(SkipReason::NonNumeric { index: 0, .. })
        ));
    }

    #[test]
    fn test_normalize_drops_non_finite() {
        let normalized =
            normalize_series(&scalars(&[0.5, f64::NAN, 0.7, f64::NEG_INFINITY])).unwrap();
        assert_eq!(normalized.values(), &[0.5, 0.7]);
        assert_eq!(normalized.len(), 2);
        assert!(!normalized.is_empty());
        assert_eq!(normalized.dropped(), 2);
    }

    #[test]
    fn test_normalize_all_non_finite() {
        assert_eq!(
            normalize_series(&scalars(&[f64::NAN, f64::INFINITY])),
            Err(SkipReason::NoFiniteValues { dropped: 2 })
        );
    }

    #[test]
    fn test_normalize_only_empty_inner_lists() {
        let series = vec![RawObservation::from(Vec::<f64>::new())];
        assert_eq!(
            normalize_series(&series),
            Err(SkipReason::NoFiniteValues { dropped: 0 })
        );
    }
}
