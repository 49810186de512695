//! Feature schema and vector construction
//!
//! The six KOI features are always laid out in [`FEATURE_NAMES`] order. The
//! same order is used to fit every model produced by the training pipeline
//! and is recorded in every model artifact, so a vector built here can be fed
//! to any installed classifier.

use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of features in the schema
pub const FEATURE_COUNT: usize = 6;

/// Column names of the feature schema, in model input order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "orbital_period",
    "transit_duration",
    "transit_depth",
    "planet_radius",
    "signal_to_noise",
    "koi_score",
];

/// Human-readable labels, positionally aligned with [`FEATURE_NAMES`]
pub const FEATURE_DISPLAY_NAMES: [&str; FEATURE_COUNT] = [
    "Orbital Period",
    "Transit Duration",
    "Transit Depth",
    "Planet Radius",
    "Signal-to-Noise",
    "KOI Score",
];

/// A named feature record as received from callers
pub type FeatureRecord = HashMap<String, f64>;

/// Numeric entries of a JSON object.
///
/// Keys outside the schema are dropped whatever their type, so callers may
/// send identifiers such as a planet name alongside the features. A schema
/// key holding anything other than a number fails with
/// [`ExoError::InvalidFeatureValue`].
pub fn record_from_json(object: &serde_json::Map<String, serde_json::Value>) -> Result<FeatureRecord> {
    let mut record = FeatureRecord::with_capacity(FEATURE_COUNT);
    for name in FEATURE_NAMES {
        let Some(value) = object.get(name) else {
            continue;
        };
        let number = value.as_f64().ok_or_else(|| ExoError::InvalidFeatureValue {
            name: name.to_string(),
            reason: format!("expected a number, got {}", value),
        })?;
        record.insert(name.to_string(), number);
    }
    Ok(record)
}

/// Fixed-order numeric input for a classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Build a vector from values already in schema order
    pub fn from_values(values: [f64; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    /// Build a vector from a named record.
    ///
    /// Fails with [`ExoError::MissingFeature`] naming the first absent key in
    /// schema order. Extra keys are ignored; values are taken as-is.
    pub fn build(record: &FeatureRecord) -> Result<Self> {
        let mut values = [0.0; FEATURE_COUNT];
        for (slot, name) in values.iter_mut().zip(FEATURE_NAMES) {
            *slot = *record
                .get(name)
                .ok_or_else(|| ExoError::MissingFeature(name.to_string()))?;
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }

    /// Value of a named feature
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }

    /// Single-row matrix for classifier input
    pub fn to_row(&self) -> Array2<f64> {
        Array2::from_shape_fn((1, FEATURE_COUNT), |(_, c)| self.0[c])
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from_vec(self.0.to_vec())
    }
}

/// Stack vectors into a row-major matrix, preserving order
pub fn stack(vectors: &[FeatureVector]) -> Array2<f64> {
    Array2::from_shape_fn((vectors.len(), FEATURE_COUNT), |(r, c)| vectors[r].0[c])
}

/// Physical-range checks applied to JSON prediction requests.
///
/// The five measured quantities must be strictly positive and `koi_score`
/// must lie in [0, 1]. Non-finite values are always rejected.
pub fn validate_ranges(vector: &FeatureVector) -> Result<()> {
    for (name, value) in FEATURE_NAMES.iter().zip(vector.values()) {
        if !value.is_finite() {
            return Err(ExoError::InvalidFeatureValue {
                name: name.to_string(),
                reason: "must be a finite number".to_string(),
            });
        }
        let in_range = if *name == "koi_score" {
            (0.0..=1.0).contains(value)
        } else {
            *value > 0.0
        };
        if !in_range {
            let reason = if *name == "koi_score" {
                format!("{} is outside [0, 1]", value)
            } else {
                format!("{} must be greater than 0", value)
            };
            return Err(ExoError::InvalidFeatureValue {
                name: name.to_string(),
                reason,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_record() -> FeatureRecord {
        [
            ("orbital_period", 365.25),
            ("transit_duration", 3.5),
            ("transit_depth", 1000.0),
            ("planet_radius", 1.2),
            ("signal_to_noise", 15.5),
            ("koi_score", 0.85),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn test_build_orders_values_by_schema() {
        let v = FeatureVector::build(&example_record()).unwrap();
        assert_eq!(v.values(), &[365.25, 3.5, 1000.0, 1.2, 15.5, 0.85]);
        assert_eq!(v.get("koi_score"), Some(0.85));
    }

    #[test]
    fn test_build_is_deterministic() {
        let record = example_record();
        let first = FeatureVector::build(&record).unwrap();
        for _ in 0..10 {
            assert_eq!(FeatureVector::build(&record).unwrap(), first);
        }
    }

    #[test]
    fn test_build_reports_each_missing_key() {
        for name in FEATURE_NAMES {
            let mut record = example_record();
            record.remove(name);
            match FeatureVector::build(&record) {
                Err(ExoError::MissingFeature(missing)) => assert_eq!(missing, name),
                other => panic!("expected MissingFeature({}), got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_build_reports_first_missing_in_schema_order() {
        let mut record = example_record();
        record.remove("koi_score");
        record.remove("transit_depth");
        match FeatureVector::build(&record) {
            Err(ExoError::MissingFeature(missing)) => assert_eq!(missing, "transit_depth"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_extra_keys_are_ignored() {
        let mut record = example_record();
        record.insert("stellar_teff".to_string(), 5700.0);
        assert!(FeatureVector::build(&record).is_ok());
    }

    #[test]
    fn test_json_record_skips_non_schema_keys() {
        let body = serde_json::json!({
            "name": "Kepler-22b",
            "discovered": 2011,
            "orbital_period": 289.9,
            "transit_duration": 7.4,
            "transit_depth": 492.0,
            "planet_radius": 2.4,
            "signal_to_noise": 38.0,
            "koi_score": 1.0,
        });
        let record = record_from_json(body.as_object().unwrap()).unwrap();
        assert_eq!(record.len(), FEATURE_COUNT);
        assert!(!record.contains_key("discovered"));
        assert_eq!(FeatureVector::build(&record).unwrap().get("orbital_period"), Some(289.9));
    }

    #[test]
    fn test_json_record_rejects_non_numeric_feature() {
        let body = serde_json::json!({ "koi_score": "high", "orbital_period": 10.0 });
        match record_from_json(body.as_object().unwrap()) {
            Err(ExoError::InvalidFeatureValue { name, .. }) => assert_eq!(name, "koi_score"),
            other => panic!("unexpected: {:?}", other),
        }

        let partial = serde_json::json!({ "orbital_period": 10.0 });
        let record = record_from_json(partial.as_object().unwrap()).unwrap();
        assert!(matches!(
            FeatureVector::build(&record),
            Err(ExoError::MissingFeature(_))
        ));
    }

    #[test]
    fn test_stack_preserves_row_order() {
        let a = FeatureVector::from_values([1.0, 2.0, 3.0, 4.0, 5.0, 0.1]);
        let b = FeatureVector::from_values([6.0, 7.0, 8.0, 9.0, 10.0, 0.2]);
        let m = stack(&[a, b]);
        assert_eq!(m.nrows(), 2);
        assert_eq!(m[[0, 0]], 1.0);
        assert_eq!(m[[1, 5]], 0.2);
    }

    #[test]
    fn test_validate_ranges() {
        let ok = FeatureVector::build(&example_record()).unwrap();
        assert!(validate_ranges(&ok).is_ok());

        let bad_score = FeatureVector::from_values([1.0, 1.0, 1.0, 1.0, 1.0, 1.5]);
        assert!(matches!(
            validate_ranges(&bad_score),
            Err(ExoError::InvalidFeatureValue { ref name, .. }) if name == "koi_score"
        ));

        let zero_period = FeatureVector::from_values([0.0, 1.0, 1.0, 1.0, 1.0, 0.5]);
        assert!(validate_ranges(&zero_period).is_err());

        let nan = FeatureVector::from_values([1.0, f64::NAN, 1.0, 1.0, 1.0, 0.5]);
        assert!(validate_ranges(&nan).is_err());
    }
}
