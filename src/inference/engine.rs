//! Prediction service over the active model

use super::{
    ClassProbabilities, Label, PredictionResult, ProbabilitySource, RowPrediction, TabularPredictions,
    TabularSummary, FALLBACK_CONFIDENCE,
};
use crate::error::{ExoError, Result};
use crate::features::{stack, FeatureVector};
use crate::registry::{LoadedModel, ModelRegistry};
use crate::tabular::TabularData;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Running counts of served predictions
#[derive(Debug, Default)]
pub struct PredictionLedger {
    total: AtomicU64,
    confirmed: AtomicU64,
    false_positive: AtomicU64,
}

/// Point-in-time copy of a [`PredictionLedger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub total_predictions: u64,
    pub confirmed: u64,
    pub false_positive: u64,
}

impl PredictionLedger {
    fn record(&self, labels: impl Iterator<Item = Label>) {
        let (mut confirmed, mut false_positive) = (0, 0);
        for label in labels {
            match label {
                Label::Confirmed => confirmed += 1,
                Label::FalsePositive => false_positive += 1,
            }
        }
        self.confirmed.fetch_add(confirmed, Ordering::Relaxed);
        self.false_positive.fetch_add(false_positive, Ordering::Relaxed);
        self.total.fetch_add(confirmed + false_positive, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            total_predictions: self.total.load(Ordering::Relaxed),
            confirmed: self.confirmed.load(Ordering::Relaxed),
            false_positive: self.false_positive.load(Ordering::Relaxed),
        }
    }
}

/// Classifies feature vectors with whatever model is active at call time.
///
/// Each call reads the registry once, so every row of a batch is scored by
/// the same model even if another request replaces it midway.
pub struct InferenceService {
    registry: Arc<ModelRegistry>,
    ledger: PredictionLedger,
}

impl InferenceService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            ledger: PredictionLedger::default(),
        }
    }

    pub fn ledger(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }

    pub fn predict_one(&self, vector: &FeatureVector) -> Result<PredictionResult> {
        let model = self.registry.get()?;
        let mut results = classify(&model, &vector.to_row())?;
        self.ledger.record(results.iter().map(|r| r.prediction));
        results
            .pop()
            .ok_or_else(|| ExoError::InternalComputation("model returned no prediction".to_string()))
    }

    /// Classify every vector in order. Any failure fails the whole batch.
    pub fn predict_batch(&self, vectors: &[FeatureVector]) -> Result<Vec<PredictionResult>> {
        let model = self.registry.get()?;
        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        let results = classify(&model, &stack(vectors))?;
        self.ledger.record(results.iter().map(|r| r.prediction));
        Ok(results)
    }

    /// Classify every row of a table that carries the six feature columns
    pub fn predict_tabular(&self, table: &TabularData) -> Result<TabularPredictions> {
        let model = self.registry.get()?;
        let vectors = table.feature_vectors()?;

        let results = if vectors.is_empty() {
            Vec::new()
        } else {
            classify(&model, &stack(&vectors))?
        };
        self.ledger.record(results.iter().map(|r| r.prediction));

        let with_probabilities = model.capabilities().predict_proba;
        let predictions: Vec<RowPrediction> = results
            .iter()
            .enumerate()
            .map(|(i, r)| RowPrediction {
                row: i + 1,
                prediction: r.prediction,
                confidence: r.confidence,
                probabilities: with_probabilities.then_some(r.probabilities),
            })
            .collect();

        let total = predictions.len();
        let confirmed = predictions
            .iter()
            .filter(|p| p.prediction == Label::Confirmed)
            .count();
        let avg_confidence = if total > 0 {
            predictions.iter().map(|p| p.confidence).sum::<f64>() / total as f64
        } else {
            0.0
        };

        Ok(TabularPredictions {
            predictions,
            summary: TabularSummary {
                total,
                confirmed,
                false_positive: total - confirmed,
                avg_confidence,
            },
        })
    }
}

/// Score a matrix of rows with one model snapshot
fn classify(model: &LoadedModel, x: &Array2<f64>) -> Result<Vec<PredictionResult>> {
    let start = Instant::now();
    let classifier = model.classifier();

    let raw = classifier
        .predict(x)
        .map_err(|e| ExoError::InternalComputation(format!("prediction failed: {}", e)))?;

    let labels = raw
        .iter()
        .map(|&class| {
            Label::from_class(class).ok_or_else(|| {
                ExoError::InternalComputation(format!("model returned undefined class {}", class))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let results = if model.capabilities().predict_proba {
        let proba = classifier
            .predict_proba(x)
            .map_err(|e| ExoError::InternalComputation(format!("probability estimate failed: {}", e)))?;
        let classes = classifier.classes();
        let column = |value: f64| classes.iter().position(|c| *c == value);
        let (fp_col, confirmed_col) = (column(0.0), column(1.0));

        labels
            .into_iter()
            .zip(proba.rows())
            .map(|(prediction, row)| {
                let probabilities = ClassProbabilities {
                    false_positive: fp_col.map_or(0.0, |c| row[c]),
                    confirmed: confirmed_col.map_or(0.0, |c| row[c]),
                };
                PredictionResult {
                    prediction,
                    confidence: row.iter().copied().fold(0.0, f64::max),
                    probabilities,
                    probability_source: ProbabilitySource::Model,
                }
            })
            .collect()
    } else {
        labels
            .into_iter()
            .map(|prediction| PredictionResult {
                prediction,
                confidence: FALLBACK_CONFIDENCE,
                probabilities: ClassProbabilities::fallback(prediction),
                probability_source: ProbabilitySource::Fallback,
            })
            .collect()
    };

    debug!(rows = x.nrows(), latency_ms = start.elapsed().as_secs_f64() * 1000.0, "Classified");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_COUNT;
    use crate::registry::ModelArtifact;
    use crate::training::{Classifier, DecisionTree, RandomForest};
    use ndarray::{Array1, Array2};

    fn toy_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((20, FEATURE_COUNT), |(r, c)| {
            if c == 5 {
                if r % 2 == 0 { 0.9 } else { 0.1 }
            } else {
                1.0 + r as f64
            }
        });
        let y = Array1::from_shape_fn(20, |r| if r % 2 == 0 { 1.0 } else { 0.0 });
        (x, y)
    }

    fn service_with(classifier: Classifier) -> (tempfile::TempDir, InferenceService) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ModelRegistry::open(dir.path()).unwrap());
        let bytes = ModelArtifact::new(classifier).to_bytes().unwrap();
        registry.load(&bytes, "model.joblib").unwrap();
        (dir, InferenceService::new(registry))
    }

    fn sample(score: f64) -> FeatureVector {
        FeatureVector::from_values([3.0, 3.0, 3.0, 3.0, 3.0, score])
    }

    #[test]
    fn test_no_model_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(ModelRegistry::open(dir.path()).unwrap());
        let service = InferenceService::new(registry);
        assert!(matches!(service.predict_one(&sample(0.5)), Err(ExoError::ModelNotLoaded)));
    }

    #[test]
    fn test_probabilistic_model() {
        let (x, y) = toy_data();
        let mut forest = RandomForest::new(10).with_random_state(42);
        forest.fit(&x, &y).unwrap();
        let (_dir, service) = service_with(Classifier::RandomForest(forest));

        let result = service.predict_one(&sample(0.9)).unwrap();
        assert_eq!(result.probability_source, ProbabilitySource::Model);
        let p = result.probabilities;
        assert!((p.false_positive + p.confirmed - 1.0).abs() < 1e-9);
        assert_eq!(result.confidence, p.false_positive.max(p.confirmed));
    }

    #[test]
    fn test_fallback_policy() {
        let (x, y) = toy_data();
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();
        let (_dir, service) = service_with(Classifier::DecisionTree(tree));

        let result = service.predict_one(&sample(0.9)).unwrap();
        assert_eq!(result.prediction, Label::Confirmed);
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(result.probability_source, ProbabilitySource::Fallback);
        assert_eq!(result.probabilities.confirmed, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_batch_preserves_order_and_counts() {
        let (x, y) = toy_data();
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();
        let (_dir, service) = service_with(Classifier::DecisionTree(tree));

        let batch = [sample(0.9), sample(0.1), sample(0.9)];
        let results = service.predict_batch(&batch).unwrap();
        let labels: Vec<Label> = results.iter().map(|r| r.prediction).collect();
        assert_eq!(labels, vec![Label::Confirmed, Label::FalsePositive, Label::Confirmed]);

        for (vector, batched) in batch.iter().zip(&results) {
            assert_eq!(&service.predict_one(vector).unwrap(), batched);
        }

        let ledger = service.ledger();
        assert_eq!(ledger.total_predictions, 6);
        assert_eq!(ledger.confirmed, 4);
    }

    #[test]
    fn test_undefined_class_is_internal_error() {
        let (x, _) = toy_data();
        let y = Array1::from_shape_fn(20, |r| if r % 2 == 0 { 2.0 } else { 0.0 });
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();
        let (_dir, service) = service_with(Classifier::DecisionTree(tree));

        assert!(matches!(
            service.predict_one(&sample(0.9)),
            Err(ExoError::InternalComputation(_))
        ));
        assert_eq!(service.ledger().total_predictions, 0);
    }
}
