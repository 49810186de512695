//! Model explainability module
//!
//! Provides:
//! - Global feature importance (native importances or absolute coefficients)
//! - Local explanations: per-feature decision-path contributions for one
//!   prediction of a tree or forest model
//! - Confusion-matrix metrics from the held-out partition of a trained
//!   model, or from a fixed synthetic sample for uploaded models

mod chart;

pub use chart::{ChartRenderer, SvgChartRenderer};

use crate::error::{ExoError, Result};
use crate::features::FeatureVector;
use crate::registry::ModelRegistry;
use crate::training::{
    rank_importances, ClassificationMetrics, ConfusionMatrix, Evaluation, FeatureWeight, ImportanceKind,
};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Seed of the synthetic evaluation sample
pub const SYNTHETIC_SEED: u64 = 42;
/// Label pairs in the synthetic evaluation sample
pub const SYNTHETIC_SAMPLES: usize = 100;
/// Pairs whose prediction is flipped in the synthetic sample
pub const SYNTHETIC_MISMATCHES: usize = 15;

/// Where importance weights came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceSource {
    FeatureImportances,
    Coefficients,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureImportanceReport {
    /// Weights keyed by display name
    pub importances: BTreeMap<String, f64>,
    /// Same weights sorted by descending value
    pub ranking: Vec<FeatureWeight>,
    pub source: ImportanceSource,
    pub plot: String,
}

/// One feature's share of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub display_name: String,
    /// Input value of the explained sample
    pub value: f64,
    /// Change in confirmed-class probability attributed to this feature
    pub contribution: f64,
}

/// Decomposition of one prediction into a base value plus per-feature
/// contributions. `base_value + sum(shap_values) == prediction`.
#[derive(Debug, Clone, Serialize)]
pub struct LocalExplanation {
    /// Confirmed-class probability before any split is applied
    pub base_value: f64,
    /// Confirmed-class probability the explained paths end in
    pub prediction: f64,
    /// Sorted by descending absolute contribution
    pub contributions: Vec<FeatureContribution>,
    /// Contributions in feature order
    pub shap_values: Vec<f64>,
    pub plot: String,
}

/// Label pairs behind a confusion matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationSource {
    /// Held-out partition recorded at training time
    Holdout,
    /// Fixed-seed simulated sample
    Synthetic,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfusionReport {
    pub metrics: ClassificationMetrics,
    pub confusion_matrix: [[usize; 2]; 2],
    pub counts: ConfusionMatrix,
    pub samples: usize,
    pub source: EvaluationSource,
    pub plot: String,
}

/// The fixed synthetic sample: random 0/1 truths with a fixed set of
/// predictions flipped. Identical on every call.
pub fn synthetic_evaluation() -> Evaluation {
    let mut rng = ChaCha8Rng::seed_from_u64(SYNTHETIC_SEED);
    let y_true: Vec<f64> = (0..SYNTHETIC_SAMPLES)
        .map(|_| if rng.gen_bool(0.5) { 1.0 } else { 0.0 })
        .collect();
    let mut y_pred = y_true.clone();
    for i in index::sample(&mut rng, SYNTHETIC_SAMPLES, SYNTHETIC_MISMATCHES) {
        y_pred[i] = 1.0 - y_pred[i];
    }
    Evaluation { y_true, y_pred }
}

pub struct ExplainabilityService {
    registry: Arc<ModelRegistry>,
    renderer: Arc<dyn ChartRenderer>,
}

impl ExplainabilityService {
    pub fn new(registry: Arc<ModelRegistry>, renderer: Arc<dyn ChartRenderer>) -> Self {
        Self { registry, renderer }
    }

    /// Weights of the active model zipped positionally with `names`.
    ///
    /// `names` must follow the order the model was fitted on; `display_names`
    /// label the chart and must be aligned with `names`.
    pub fn feature_importance(&self, names: &[&str], display_names: &[&str]) -> Result<FeatureImportanceReport> {
        let model = self.registry.get()?;
        let source = match model.capabilities().importance {
            ImportanceKind::Native => ImportanceSource::FeatureImportances,
            ImportanceKind::Coefficients => ImportanceSource::Coefficients,
            ImportanceKind::None => {
                return Err(ExoError::NotSupported(format!(
                    "feature importance ({})",
                    model.classifier().type_name()
                )))
            }
        };
        let weights = model
            .classifier()
            .importance()
            .ok_or_else(|| ExoError::NotSupported("feature importance (model not fitted)".to_string()))?
            .to_vec();

        if weights.len() != names.len() || display_names.len() != names.len() {
            return Err(ExoError::InvalidParameter {
                name: "feature_names".to_string(),
                value: names.len().to_string(),
                reason: format!("model has {} weights", weights.len()),
            });
        }

        let ranking = rank_importances(names, &weights);
        let importances = display_names
            .iter()
            .zip(&weights)
            .map(|(label, w)| (label.to_string(), *w))
            .collect();

        let mut bars: Vec<(String, f64)> = display_names
            .iter()
            .zip(&weights)
            .map(|(label, w)| (label.to_string(), *w))
            .collect();
        bars.sort_by(|a, b| b.1.total_cmp(&a.1));
        let plot = self.renderer.bar_chart("Feature Importance", &bars);

        Ok(FeatureImportanceReport {
            importances,
            ranking,
            source,
            plot,
        })
    }

    /// Explain one prediction of the active model toward the confirmed class.
    ///
    /// Only tree and forest models support this; other families fail with
    /// [`ExoError::NotSupported`]. `names` and `display_names` follow the
    /// same rules as in [`ExplainabilityService::feature_importance`].
    pub fn local_explanation(
        &self,
        vector: &FeatureVector,
        names: &[&str],
        display_names: &[&str],
    ) -> Result<LocalExplanation> {
        let model = self.registry.get()?;
        let sample = vector.to_array();
        let (base_value, shap_values) = model.classifier().path_contributions(&sample.view(), 1.0)?;

        if shap_values.len() != names.len() || display_names.len() != names.len() {
            return Err(ExoError::InvalidParameter {
                name: "feature_names".to_string(),
                value: names.len().to_string(),
                reason: format!("model explains {} features", shap_values.len()),
            });
        }

        let mut contributions: Vec<FeatureContribution> = names
            .iter()
            .zip(display_names)
            .zip(sample.iter().zip(&shap_values))
            .map(|((name, label), (value, contribution))| FeatureContribution {
                feature: name.to_string(),
                display_name: label.to_string(),
                value: *value,
                contribution: *contribution,
            })
            .collect();
        contributions.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));

        let bars: Vec<(String, f64)> = contributions
            .iter()
            .map(|c| (c.display_name.clone(), c.contribution))
            .collect();
        let plot = self.renderer.bar_chart("Feature Contributions", &bars);

        Ok(LocalExplanation {
            base_value,
            prediction: base_value + shap_values.iter().sum::<f64>(),
            contributions,
            shap_values,
            plot,
        })
    }

    /// Accuracy, precision, recall, F1 and the 2x2 matrix for the active model
    pub fn confusion_matrix(&self) -> Result<ConfusionReport> {
        let model = self.registry.get()?;
        let (evaluation, source) = match model.evaluation() {
            Some(holdout) if !holdout.is_empty() => (holdout.clone(), EvaluationSource::Holdout),
            _ => (synthetic_evaluation(), EvaluationSource::Synthetic),
        };

        let counts = evaluation.confusion();
        let plot = self.renderer.confusion_heatmap(
            "Confusion Matrix",
            ["False Positive", "Confirmed"],
            counts.as_rows(),
        );

        Ok(ConfusionReport {
            metrics: ClassificationMetrics::from_confusion(&counts),
            confusion_matrix: counts.as_rows(),
            counts,
            samples: evaluation.len(),
            source,
            plot,
        })
    }
}
