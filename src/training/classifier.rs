//! Capability-tagged classifier wrapper

use super::baseline::MajorityClass;
use super::decision_tree::DecisionTree;
use super::linear_models::LogisticRegression;
use super::random_forest::RandomForest;
use crate::error::{ExoError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Where a model's per-feature weights come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceKind {
    /// Impurity-based importances computed during fit
    Native,
    /// Absolute values of linear coefficients
    Coefficients,
    None,
}

/// What a fitted classifier can do beyond `predict`.
///
/// Computed once when a model is installed; callers branch on these flags
/// rather than probing the model per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub predict_proba: bool,
    pub importance: ImportanceKind,
}

/// A fitted classifier of one of the supported families
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model")]
pub enum Classifier {
    RandomForest(RandomForest),
    DecisionTree(DecisionTree),
    LogisticRegression(LogisticRegression),
    MajorityClass(MajorityClass),
}

impl Classifier {
    /// Type name reported in model metadata
    pub fn type_name(&self) -> &'static str {
        match self {
            Classifier::RandomForest(_) => "RandomForestClassifier",
            Classifier::DecisionTree(_) => "DecisionTreeClassifier",
            Classifier::LogisticRegression(_) => "LogisticRegression",
            Classifier::MajorityClass(_) => "MajorityClassClassifier",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Classifier::RandomForest(_) => Capabilities {
                predict_proba: true,
                importance: ImportanceKind::Native,
            },
            Classifier::DecisionTree(_) => Capabilities {
                predict_proba: false,
                importance: ImportanceKind::Native,
            },
            Classifier::LogisticRegression(_) => Capabilities {
                predict_proba: true,
                importance: ImportanceKind::Coefficients,
            },
            Classifier::MajorityClass(_) => Capabilities {
                predict_proba: false,
                importance: ImportanceKind::None,
            },
        }
    }

    /// Number of input columns the model was fitted on
    pub fn n_features(&self) -> usize {
        match self {
            Classifier::RandomForest(m) => m.n_features(),
            Classifier::DecisionTree(m) => m.n_features(),
            Classifier::LogisticRegression(m) => m.n_features(),
            Classifier::MajorityClass(m) => m.n_features(),
        }
    }

    /// Raw class value for every row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Classifier::RandomForest(m) => m.predict(x),
            Classifier::DecisionTree(m) => m.predict(x),
            Classifier::LogisticRegression(m) => m.predict(x),
            Classifier::MajorityClass(m) => m.predict(x),
        }
    }

    /// Class values matching the columns of [`Classifier::predict_proba`]
    pub fn classes(&self) -> Vec<f64> {
        match self {
            Classifier::RandomForest(m) => m.classes().to_vec(),
            Classifier::DecisionTree(m) => m.classes().to_vec(),
            Classifier::LogisticRegression(_) => vec![0.0, 1.0],
            Classifier::MajorityClass(_) => Vec::new(),
        }
    }

    /// Per-class probabilities, one row per input
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            Classifier::RandomForest(m) => m.predict_proba(x),
            Classifier::LogisticRegression(m) => {
                let p = m.predict_proba(x)?;
                Ok(Array2::from_shape_fn((p.len(), 2), |(i, c)| {
                    if c == 1 {
                        p[i]
                    } else {
                        1.0 - p[i]
                    }
                }))
            }
            _ => Err(ExoError::NotSupported(format!(
                "probability estimates ({})",
                self.type_name()
            ))),
        }
    }

    /// Structural check run on every decoded artifact
    pub fn validate(&self) -> Result<()> {
        match self {
            Classifier::RandomForest(m) => m.validate(),
            Classifier::DecisionTree(m) => m.validate(),
            Classifier::LogisticRegression(m) => m.validate(),
            Classifier::MajorityClass(m) => m.validate(),
        }
    }

    /// Base value and per-feature contributions toward `class` for one
    /// sample. Only tree models can attribute a prediction this way.
    pub fn path_contributions(&self, sample: &ArrayView1<f64>, class: f64) -> Result<(f64, Vec<f64>)> {
        match self {
            Classifier::RandomForest(m) => m.path_contributions(sample, class),
            Classifier::DecisionTree(m) => m.path_contributions(sample, class),
            _ => Err(ExoError::NotSupported(format!(
                "local explanation ({})",
                self.type_name()
            ))),
        }
    }

    /// Non-negative per-feature weights, or `None` when the model has none
    pub fn importance(&self) -> Option<Array1<f64>> {
        match self {
            Classifier::RandomForest(m) => m.feature_importances().cloned(),
            Classifier::DecisionTree(m) => m.feature_importances().cloned(),
            Classifier::LogisticRegression(m) => m.coefficients.as_ref().map(|c| c.mapv(f64::abs)),
            Classifier::MajorityClass(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn data() -> (Array2<f64>, Array1<f64>) {
        (
            array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]],
            array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        )
    }

    #[test]
    fn test_capabilities_per_family() {
        let (x, y) = data();

        let mut forest = RandomForest::new(5).with_random_state(1);
        forest.fit(&x, &y).unwrap();
        let forest = Classifier::RandomForest(forest);
        assert!(forest.capabilities().predict_proba);
        assert_eq!(forest.capabilities().importance, ImportanceKind::Native);

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();
        let tree = Classifier::DecisionTree(tree);
        assert!(!tree.capabilities().predict_proba);
        assert!(matches!(tree.predict_proba(&x), Err(ExoError::NotSupported(_))));

        let mut baseline = MajorityClass::new();
        baseline.fit(&x, &y).unwrap();
        let baseline = Classifier::MajorityClass(baseline);
        assert_eq!(baseline.capabilities().importance, ImportanceKind::None);
        assert!(baseline.importance().is_none());
    }

    #[test]
    fn test_logistic_proba_columns_sum_to_one() {
        let (x, y) = data();
        let mut lr = LogisticRegression::new();
        lr.fit(&x, &y).unwrap();
        let model = Classifier::LogisticRegression(lr);

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.ncols(), 2);
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }
        assert!(model.importance().unwrap().iter().all(|w| *w >= 0.0));
    }

    #[test]
    fn test_serde_round_trip_keeps_predictions() {
        let (x, y) = data();
        let mut forest = RandomForest::new(5).with_random_state(9);
        forest.fit(&x, &y).unwrap();
        let model = Classifier::RandomForest(forest);

        let json = serde_json::to_vec(&model).unwrap();
        let restored: Classifier = serde_json::from_slice(&json).unwrap();
        assert_eq!(model.predict(&x).unwrap(), restored.predict(&x).unwrap());
        assert_eq!(restored.type_name(), "RandomForestClassifier");
    }

    #[test]
    fn test_local_explanation_limited_to_trees() {
        let (x, y) = data();
        let mut lr = LogisticRegression::new();
        lr.fit(&x, &y).unwrap();
        let model = Classifier::LogisticRegression(lr);
        assert!(matches!(
            model.path_contributions(&x.row(0), 1.0),
            Err(ExoError::NotSupported(_))
        ));

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();
        let tree = Classifier::DecisionTree(tree);
        tree.validate().unwrap();
        let (bias, contributions) = tree.path_contributions(&x.row(5), 1.0).unwrap();
        assert!((bias + contributions.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}
