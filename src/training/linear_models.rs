//! Linear model implementations

use super::decision_tree::{check_width, malformed, not_fitted};
use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Logistic regression for binary 0/1 classification.
///
/// Inputs are standardized with the training means and deviations before
/// the gradient-descent fit, so the stored coefficients are on a common
/// scale and their magnitudes are comparable across features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Fitted coefficients (standardized feature space)
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept
    pub intercept: Option<f64>,
    /// Regularization strength (L2)
    pub alpha: f64,
    /// Maximum iterations
    pub max_iter: usize,
    /// Convergence tolerance
    pub tol: f64,
    /// Learning rate
    pub learning_rate: f64,
    means: Option<Array1<f64>>,
    scales: Option<Array1<f64>>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    /// Create a new logistic regression model
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
            means: None,
            scales: None,
        }
    }

    /// Set maximum iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Sigmoid function
    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    fn standardize(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (Some(means), Some(scales)) = (&self.means, &self.scales) else {
            return Err(not_fitted());
        };
        check_width(x, means.len())?;
        Ok((x - means) / scales)
    }

    /// Fit the model using gradient descent
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(ExoError::InvalidParameter {
                name: "y".to_string(),
                value: y.len().to_string(),
                reason: format!("expected {} labels to match the rows of x", n_samples),
            });
        }
        if n_samples == 0 {
            return Err(ExoError::InsufficientData("no samples to fit".to_string()));
        }
        if let Some(bad) = y.iter().find(|v| **v != 0.0 && **v != 1.0) {
            return Err(ExoError::InvalidParameter {
                name: "y".to_string(),
                value: bad.to_string(),
                reason: "logistic regression expects 0/1 labels".to_string(),
            });
        }

        let means = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let scales = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });
        self.means = Some(means);
        self.scales = Some(scales);
        let xs = self.standardize(x)?;

        // Initialize weights
        let mut weights = Array1::zeros(n_features);
        let mut bias = 0.0;

        let lr = self.learning_rate;
        let alpha = self.alpha;

        for _iter in 0..self.max_iter {
            // Forward pass
            let linear = xs.dot(&weights) + bias;
            let predictions = Self::sigmoid(&linear);

            // Compute gradients
            let errors = &predictions - y;
            let dw = (xs.t().dot(&errors) / n_samples as f64) + (alpha * &weights);
            let db = errors.mean().unwrap_or(0.0);

            // Check convergence
            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }

            weights = weights - lr * dw;
            bias -= lr * db;
        }

        self.coefficients = Some(weights);
        self.intercept = Some(bias);

        Ok(self)
    }

    /// Probability of class 1 for every row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or_else(not_fitted)?;
        let intercept = self.intercept.unwrap_or(0.0);

        let linear = self.standardize(x)?.dot(coefficients) + intercept;
        Ok(Self::sigmoid(&linear))
    }

    /// Predict class labels
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 }))
    }

    pub fn n_features(&self) -> usize {
        self.means.as_ref().map_or(0, |m| m.len())
    }

    /// Coefficients, means and scales must all be present and agree in length.
    pub fn validate(&self) -> Result<()> {
        let (Some(coefficients), Some(means), Some(scales)) = (&self.coefficients, &self.means, &self.scales) else {
            return Err(malformed("logistic regression is missing fitted parameters"));
        };
        let n = means.len();
        if n == 0 || coefficients.len() != n || scales.len() != n {
            return Err(malformed(format!(
                "logistic regression has {} coefficients, {} means and {} scales",
                coefficients.len(),
                n,
                scales.len()
            )));
        }
        if scales.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(malformed("logistic regression has a zero or non-finite scale"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_logistic_regression_separates_classes() {
        let x = array![
            [1.0, 100.0],
            [2.0, 110.0],
            [3.0, 90.0],
            [7.0, 105.0],
            [8.0, 95.0],
            [9.0, 100.0],
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];

        let mut model = LogisticRegression::new().with_max_iter(2000);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let coef = model.coefficients.as_ref().unwrap();
        assert!(coef[0].abs() > coef[1].abs());
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![0.0, 1.0, 2.0];
        let mut model = LogisticRegression::new();
        assert!(matches!(model.fit(&x, &y), Err(ExoError::InvalidParameter { .. })));
    }

    #[test]
    fn test_constant_column_does_not_produce_nan() {
        let x = array![[1.0, 5.0], [2.0, 5.0], [3.0, 5.0], [4.0, 5.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_unfitted_model_errors() {
        let model = LogisticRegression::new();
        assert!(model.predict(&array![[1.0]]).is_err());
    }

    #[test]
    fn test_validate_checks_parameter_lengths() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 4.0], [4.0, 3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = LogisticRegression::new();
        model.fit(&x, &y).unwrap();
        assert!(model.validate().is_ok());

        let mut short = model.clone();
        short.coefficients = Some(array![0.5]);
        assert!(matches!(short.validate(), Err(ExoError::InvalidArtifact(_))));

        let mut zero_scale = model.clone();
        zero_scale.scales = Some(array![1.0, 0.0]);
        assert!(matches!(zero_scale.validate(), Err(ExoError::InvalidArtifact(_))));

        assert!(matches!(LogisticRegression::new().validate(), Err(ExoError::InvalidArtifact(_))));
    }
}
