//! Majority-class baseline

use super::decision_tree::{check_width, distinct_classes, malformed, not_fitted};
use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Predicts the most frequent training class for every input.
///
/// Offers neither probabilities nor importances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MajorityClass {
    class: Option<f64>,
    n_features: usize,
}

impl MajorityClass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if y.is_empty() {
            return Err(ExoError::InsufficientData("no samples to fit".to_string()));
        }
        let classes = distinct_classes(y);
        let counts: Vec<usize> = classes
            .iter()
            .map(|c| y.iter().filter(|v| *v == c).count())
            .collect();

        // ties go to the lowest class value
        let mut best = 0;
        for (i, &n) in counts.iter().enumerate() {
            if n > counts[best] {
                best = i;
            }
        }

        self.class = Some(classes[best]);
        self.n_features = x.ncols();
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let class = self.class.ok_or_else(not_fitted)?;
        check_width(x, self.n_features)?;
        Ok(Array1::from_elem(x.nrows(), class))
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn validate(&self) -> Result<()> {
        match self.class {
            Some(c) if c.is_finite() && self.n_features > 0 => Ok(()),
            _ => Err(malformed("majority baseline has no class or no features")),
        }
    }
}
