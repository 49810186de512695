//! Binary classification metrics

use serde::{Deserialize, Serialize};

/// 2x2 confusion counts with class 1 (confirmed) as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    /// Count label pairs. Values above 0.5 are treated as the positive class.
    pub fn from_labels(y_true: &[f64], y_pred: &[f64]) -> Self {
        let mut cm = Self::default();
        for (t, p) in y_true.iter().zip(y_pred) {
            match (*t > 0.5, *p > 0.5) {
                (true, true) => cm.true_positive += 1,
                (false, true) => cm.false_positive += 1,
                (false, false) => cm.true_negative += 1,
                (true, false) => cm.false_negative += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }

    /// Rows are actual `[0, 1]`, columns are predicted `[0, 1]`
    pub fn as_rows(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negative, self.false_positive],
            [self.false_negative, self.true_positive],
        ]
    }
}

/// Accuracy, precision, recall and F1.
///
/// A ratio with a zero denominator is reported as 0 instead of failing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

impl ClassificationMetrics {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };

        let precision = ratio(cm.true_positive, cm.true_positive + cm.false_positive);
        let recall = ratio(cm.true_positive, cm.true_positive + cm.false_negative);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy: ratio(cm.true_positive + cm.true_negative, cm.total()),
            precision,
            recall,
            f1_score,
        }
    }

    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        Self::from_confusion(&ConfusionMatrix::from_labels(y_true, y_pred))
    }
}

/// Evaluation summary produced by the training pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetrics {
    #[serde(flatten)]
    pub scores: ClassificationMetrics,
    pub train_samples: usize,
    pub test_samples: usize,
    pub training_time_secs: f64,
}

/// True and predicted labels of a held-out partition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub y_true: Vec<f64>,
    pub y_pred: Vec<f64>,
}

impl Evaluation {
    pub fn confusion(&self) -> ConfusionMatrix {
        ConfusionMatrix::from_labels(&self.y_true, &self.y_pred)
    }

    pub fn len(&self) -> usize {
        self.y_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y_true.is_empty()
    }
}

/// One feature's weight in an importance ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub importance: f64,
}

/// Pair weights with names positionally and sort by descending weight.
/// Equal weights keep their positional order.
pub fn rank_importances(names: &[&str], weights: &[f64]) -> Vec<FeatureWeight> {
    let mut ranked: Vec<FeatureWeight> = names
        .iter()
        .zip(weights)
        .map(|(name, w)| FeatureWeight {
            feature: name.to_string(),
            importance: *w,
        })
        .collect();
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_metrics() {
        let y_true = [1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let y_pred = [1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0];

        let cm = ConfusionMatrix::from_labels(&y_true, &y_pred);
        assert_eq!(cm.as_rows(), [[3, 1], [1, 3]]);

        let metrics = ClassificationMetrics::from_confusion(&cm);
        assert!((metrics.accuracy - 0.75).abs() < 1e-12);
        assert!((metrics.precision - 0.75).abs() < 1e-12);
        assert!((metrics.recall - 0.75).abs() < 1e-12);
        assert!((metrics.f1_score - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_reports_zero() {
        let metrics = ClassificationMetrics::compute(&[0.0, 0.0], &[0.0, 0.0]);
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f1_score, 0.0);

        let empty = ClassificationMetrics::compute(&[], &[]);
        assert_eq!(empty.accuracy, 0.0);
    }

    #[test]
    fn test_rank_importances_sorts_descending() {
        let ranked = rank_importances(&["a", "b", "c"], &[0.2, 0.5, 0.2]);
        let names: Vec<&str> = ranked.iter().map(|w| w.feature.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_training_metrics_serialize_flat() {
        let metrics = TrainingMetrics {
            scores: ClassificationMetrics::compute(&[1.0], &[1.0]),
            train_samples: 8,
            test_samples: 2,
            training_time_secs: 0.1,
        };
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["accuracy"], 1.0);
        assert_eq!(json["train_samples"], 8);
    }
}
