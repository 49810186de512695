//! Retraining pipeline: clean, split, fit, evaluate, persist, swap

use super::classifier::Classifier;
use super::config::{ModelType, TrainingConfig};
use super::metrics::{rank_importances, ClassificationMetrics, Evaluation, FeatureWeight, TrainingMetrics};
use super::split::stratified_split;
use super::{DecisionTree, LogisticRegression, MajorityClass, RandomForest};
use crate::error::{ExoError, Result};
use crate::features::{FEATURE_COUNT, FEATURE_NAMES};
use crate::registry::{LoadedModel, ModelArtifact, ModelFormat, ModelMetadata, ModelRegistry};
use crate::tabular::TabularData;
use chrono::Utc;
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Encoded disposition of a training row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    FalsePositive = 0,
    Confirmed = 1,
    Candidate = 2,
}

impl Disposition {
    /// Map a target cell: `CONFIRMED`, `FALSE POSITIVE`, `CANDIDATE` (any case,
    /// surrounding whitespace ignored) or the numeric codes 0, 1 and 2.
    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim();
        match value.to_ascii_uppercase().as_str() {
            "CONFIRMED" => return Some(Disposition::Confirmed),
            "FALSE POSITIVE" => return Some(Disposition::FalsePositive),
            "CANDIDATE" => return Some(Disposition::Candidate),
            _ => {}
        }
        match value.parse::<f64>() {
            Ok(v) if v == 0.0 => Some(Disposition::FalsePositive),
            Ok(v) if v == 1.0 => Some(Disposition::Confirmed),
            Ok(v) if v == 2.0 => Some(Disposition::Candidate),
            _ => None,
        }
    }

    /// Binary training label; candidates have none
    pub fn binary_label(&self) -> Option<f64> {
        match self {
            Disposition::FalsePositive => Some(0.0),
            Disposition::Confirmed => Some(1.0),
            Disposition::Candidate => None,
        }
    }
}

/// Cleaned binary training data
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    /// Rows with a missing feature or target cell
    pub dropped_incomplete: usize,
    /// Rows whose target is a candidate or unrecognized
    pub dropped_unlabeled: usize,
}

impl LabeledDataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn count(&self, label: f64) -> usize {
        self.y.iter().filter(|v| **v == label).count()
    }
}

/// Validate columns, drop incomplete rows and keep binary-labeled rows
pub fn prepare_dataset(table: &TabularData, target: &str, min_rows: usize) -> Result<LabeledDataset> {
    let mut required: Vec<&str> = FEATURE_NAMES.to_vec();
    required.push(target);
    table.require_columns(&required)?;

    let rows = table.feature_rows()?;
    let targets = table.text_column(target)?;

    let mut values = Vec::with_capacity(rows.len() * FEATURE_COUNT);
    let mut labels = Vec::with_capacity(rows.len());
    let mut dropped_incomplete = 0;
    let mut dropped_unlabeled = 0;

    for (row, target) in rows.iter().zip(&targets) {
        let (Some(target), true) = (target, row.iter().all(|c| c.is_some())) else {
            dropped_incomplete += 1;
            continue;
        };
        match Disposition::parse(target).and_then(|d| d.binary_label()) {
            Some(label) => {
                values.extend(row.iter().flatten());
                labels.push(label);
            }
            None => dropped_unlabeled += 1,
        }
    }

    let n = labels.len();
    debug!(rows = n, dropped_incomplete, dropped_unlabeled, "Prepared training rows");

    if n < min_rows {
        return Err(ExoError::InsufficientData(format!(
            "{} usable rows after cleaning, at least {} required",
            n, min_rows
        )));
    }

    let x = Array2::from_shape_vec((n, FEATURE_COUNT), values)
        .map_err(|e| ExoError::InternalComputation(e.to_string()))?;
    let dataset = LabeledDataset {
        x,
        y: Array1::from_vec(labels),
        dropped_incomplete,
        dropped_unlabeled,
    };

    let confirmed = dataset.count(1.0);
    let false_positive = dataset.count(0.0);
    if confirmed == 0 || false_positive == 0 {
        return Err(ExoError::ClassImbalance(format!(
            "training data needs both classes, found {} confirmed and {} false positive",
            confirmed, false_positive
        )));
    }
    if confirmed < 2 || false_positive < 2 {
        return Err(ExoError::ClassImbalance(format!(
            "each class needs at least 2 rows for a stratified split, found {} confirmed and {} false positive",
            confirmed, false_positive
        )));
    }

    Ok(dataset)
}

/// A fitted and evaluated classifier, not yet persisted
#[derive(Debug, Clone)]
pub struct FittedModel {
    pub classifier: Classifier,
    pub metrics: TrainingMetrics,
    pub feature_importance: Vec<FeatureWeight>,
    pub evaluation: Evaluation,
}

/// Split, fit on the train partition and score on the test partition
pub fn fit_model(config: &TrainingConfig, dataset: &LabeledDataset, test_size: f64, seed: u64) -> Result<FittedModel> {
    let labels = dataset.y.to_vec();
    let split = stratified_split(&labels, test_size, seed)?;

    let x_train = dataset.x.select(Axis(0), &split.train);
    let y_train = dataset.y.select(Axis(0), &split.train);
    let x_test = dataset.x.select(Axis(0), &split.test);
    let y_test = dataset.y.select(Axis(0), &split.test);

    debug!(model = ?config.model_type, seed, "Fitting classifier");
    let start = Instant::now();
    let classifier = match config.model_type {
        ModelType::RandomForest => {
            let mut model = RandomForest::new(config.n_estimators)
                .with_min_samples_leaf(config.min_samples_leaf)
                .with_random_state(seed);
            if let Some(depth) = config.max_depth {
                model = model.with_max_depth(depth);
            }
            model.fit(&x_train, &y_train)?;
            Classifier::RandomForest(model)
        }
        ModelType::DecisionTree => {
            let mut model = DecisionTree::new()
                .with_min_samples_leaf(config.min_samples_leaf)
                .with_random_state(seed);
            if let Some(depth) = config.max_depth {
                model = model.with_max_depth(depth);
            }
            model.fit(&x_train, &y_train)?;
            Classifier::DecisionTree(model)
        }
        ModelType::LogisticRegression => {
            let mut model = LogisticRegression::new();
            model.fit(&x_train, &y_train)?;
            Classifier::LogisticRegression(model)
        }
        ModelType::MajorityClass => {
            let mut model = MajorityClass::new();
            model.fit(&x_train, &y_train)?;
            Classifier::MajorityClass(model)
        }
    };
    let training_time_secs = start.elapsed().as_secs_f64();

    let y_pred = classifier.predict(&x_test)?;
    let evaluation = Evaluation {
        y_true: y_test.to_vec(),
        y_pred: y_pred.to_vec(),
    };
    let scores = ClassificationMetrics::from_confusion(&evaluation.confusion());

    let feature_importance = classifier
        .importance()
        .map(|w| rank_importances(&FEATURE_NAMES, &w.to_vec()))
        .unwrap_or_default();

    info!(
        model = classifier.type_name(),
        train = split.train.len(),
        test = split.test.len(),
        accuracy = scores.accuracy,
        f1 = scores.f1_score,
        secs = training_time_secs,
        "Model fitted"
    );

    Ok(FittedModel {
        classifier,
        metrics: TrainingMetrics {
            scores,
            train_samples: split.train.len(),
            test_samples: split.test.len(),
            training_time_secs,
        },
        feature_importance,
        evaluation,
    })
}

/// Outcome of a successful retrain
#[derive(Debug, Clone, Serialize)]
pub struct TrainingResult {
    pub metrics: TrainingMetrics,
    /// Sorted by descending weight
    pub feature_importance: Vec<FeatureWeight>,
    /// File name of the persisted artifact inside the models directory
    pub artifact: String,
    pub metadata: ModelMetadata,
    pub dropped_incomplete: usize,
    pub dropped_unlabeled: usize,
}

/// A fitted model waiting to be persisted and installed
#[derive(Debug, Clone)]
pub struct StagedModel {
    /// Registry epoch read before fitting began
    pub epoch: u64,
    pub fitted: FittedModel,
    pub dropped_incomplete: usize,
    pub dropped_unlabeled: usize,
}

/// Retrains the active model from labeled CSV data
pub struct TrainingPipeline {
    registry: Arc<ModelRegistry>,
    config: TrainingConfig,
}

impl TrainingPipeline {
    pub fn new(registry: Arc<ModelRegistry>, config: TrainingConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit a new classifier and install it as the active model.
    ///
    /// Nothing in the registry changes unless every step succeeds. If a load
    /// or remove happens while the model is being fitted the result is
    /// discarded with [`ExoError::Cancelled`]. This is the conditional
    /// counterpart of [`ModelRegistry::swap`].
    pub fn train_from_csv(&self, table: &TabularData, test_size: f64, seed: u64) -> Result<TrainingResult> {
        let staged = self.stage(table, test_size, seed)?;
        self.commit(staged)
    }

    /// Validate, clean and fit without touching the registry or the disk.
    ///
    /// The registry epoch is captured first, so a load or remove that lands
    /// before [`TrainingPipeline::commit`] cancels the commit.
    pub fn stage(&self, table: &TabularData, test_size: f64, seed: u64) -> Result<StagedModel> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(ExoError::InvalidParameter {
                name: "test_size".to_string(),
                value: test_size.to_string(),
                reason: "must be strictly between 0 and 1".to_string(),
            });
        }

        let epoch = self.registry.epoch();
        info!(rows = table.height(), test_size, seed, "Retraining started");

        let dataset = prepare_dataset(table, &self.config.target_column, self.config.min_rows)?;
        let fitted = fit_model(&self.config, &dataset, test_size, seed)?;

        Ok(StagedModel {
            epoch,
            fitted,
            dropped_incomplete: dataset.dropped_incomplete,
            dropped_unlabeled: dataset.dropped_unlabeled,
        })
    }

    /// Persist a staged model and install it if the registry is unchanged
    /// since staging began.
    pub fn commit(&self, staged: StagedModel) -> Result<TrainingResult> {
        let StagedModel {
            epoch,
            fitted,
            dropped_incomplete,
            dropped_unlabeled,
        } = staged;

        self.registry.ensure_current(epoch)?;

        let artifact = ModelArtifact::new(fitted.classifier.clone())
            .with_evaluation(fitted.evaluation.clone())
            .with_metrics(fitted.metrics.clone());
        let stored = self.registry.store().save_trained(&artifact, &fitted.feature_importance)?;

        let metadata = ModelMetadata {
            filename: stored.filename.clone(),
            size: stored.size,
            uploaded_at: Utc::now(),
            format: ModelFormat::Joblib,
            model_type: Some(fitted.classifier.type_name().to_string()),
            trained: true,
            inference_available: true,
            note: None,
        };
        let model = LoadedModel::new(fitted.classifier)
            .with_evaluation(fitted.evaluation)
            .with_training_metrics(fitted.metrics.clone());

        if let Err(e) = self.registry.swap_if_current(epoch, model, metadata.clone()) {
            warn!(artifact = %stored.path.display(), error = %e, "Trained model persisted but not installed");
            return Err(e);
        }

        Ok(TrainingResult {
            metrics: fitted.metrics,
            feature_importance: fitted.feature_importance,
            artifact: stored.filename,
            metadata,
            dropped_incomplete,
            dropped_unlabeled,
        })
    }

    /// Run [`TrainingPipeline::train_from_csv`] on the blocking thread pool
    pub async fn train_in_background(self: Arc<Self>, table: TabularData, test_size: f64, seed: u64) -> Result<TrainingResult> {
        tokio::task::spawn_blocking(move || self.train_from_csv(&table, test_size, seed))
            .await
            .map_err(|e| ExoError::InternalComputation(format!("training task failed: {}", e)))?
    }
}
