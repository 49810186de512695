//! Integration test: Training pipeline end-to-end

mod common;

use exovision::error::ExoError;
use exovision::registry::{sidecar_path, ModelArtifact, ModelRegistry};
use exovision::tabular::TabularData;
use exovision::training::{
    fit_model, prepare_dataset, Classifier, ModelType, TrainingConfig, TrainingPipeline,
};
use std::sync::Arc;

fn table(csv: &str) -> TabularData {
    TabularData::from_csv_bytes(csv.as_bytes()).unwrap()
}

fn small_forest() -> TrainingConfig {
    TrainingConfig::default().with_n_estimators(15)
}

#[test]
fn test_prepare_dataset_drops_candidates_and_incomplete_rows() {
    let data = table(&common::labeled_csv_with_noise(40, 3));
    let dataset = prepare_dataset(&data, "label", 10).unwrap();
    assert_eq!(dataset.len(), 40);
    assert_eq!(dataset.dropped_unlabeled, 3);
    assert_eq!(dataset.dropped_incomplete, 1);
    assert_eq!(dataset.count(1.0), 20);
    assert_eq!(dataset.count(0.0), 20);
}

#[test]
fn test_prepare_dataset_lists_every_missing_column() {
    let data = table("orbital_period,transit_depth\n1.0,2.0\n");
    match prepare_dataset(&data, "label", 10) {
        Err(ExoError::MissingColumns(cols)) => {
            assert!(cols.contains(&"koi_score".to_string()));
            assert!(cols.contains(&"label".to_string()));
            assert!(!cols.contains(&"orbital_period".to_string()));
        }
        other => panic!("expected MissingColumns, got {:?}", other.map(|d| d.len())),
    }
}

#[test]
fn test_prepare_dataset_rejects_small_and_single_class_tables() {
    let data = table(&common::labeled_csv(6));
    assert!(matches!(
        prepare_dataset(&data, "label", 10),
        Err(ExoError::InsufficientData(_))
    ));

    let only_confirmed: String = common::labeled_csv(40)
        .lines()
        .filter(|l| !l.ends_with("FALSE POSITIVE"))
        .map(|l| format!("{}\n", l))
        .collect();
    assert!(matches!(
        prepare_dataset(&table(&only_confirmed), "label", 10),
        Err(ExoError::ClassImbalance(_))
    ));
}

#[test]
fn test_every_model_type_fits_separable_data() {
    let dataset = prepare_dataset(&table(&common::labeled_csv(60)), "label", 10).unwrap();
    for model_type in [
        ModelType::RandomForest,
        ModelType::DecisionTree,
        ModelType::LogisticRegression,
    ] {
        let config = small_forest().with_model(model_type);
        let fitted = fit_model(&config, &dataset, 0.2, 42).unwrap();
        assert_eq!(fitted.metrics.test_samples, 12, "{:?}", model_type);
        assert_eq!(fitted.metrics.train_samples, 48, "{:?}", model_type);
        assert!(
            fitted.metrics.scores.accuracy >= 0.9,
            "{:?} accuracy {}",
            model_type,
            fitted.metrics.scores.accuracy
        );
        assert_eq!(fitted.feature_importance.len(), 6);
    }

    let baseline = fit_model(&small_forest().with_model(ModelType::MajorityClass), &dataset, 0.2, 42).unwrap();
    assert!(baseline.feature_importance.is_empty());
    assert!(matches!(baseline.classifier, Classifier::MajorityClass(_)));
}

#[test]
fn test_training_is_deterministic_for_a_seed() {
    let dataset = prepare_dataset(&table(&common::labeled_csv(50)), "label", 10).unwrap();
    let config = small_forest();
    let a = fit_model(&config, &dataset, 0.25, 7).unwrap();
    let b = fit_model(&config, &dataset, 0.25, 7).unwrap();

    assert_eq!(a.evaluation, b.evaluation);
    assert_eq!(a.metrics.scores, b.metrics.scores);
    assert_eq!(a.feature_importance, b.feature_importance);

    let bytes_a = serde_json::to_value(&a.classifier).unwrap();
    let bytes_b = serde_json::to_value(&b.classifier).unwrap();
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn test_pipeline_installs_and_persists_model() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ModelRegistry::open(dir.path()).unwrap());
    let pipeline = TrainingPipeline::new(Arc::clone(&registry), small_forest());

    let result = pipeline
        .train_from_csv(&table(&common::labeled_csv_with_noise(40, 2)), 0.2, 42)
        .unwrap();

    assert!(result.artifact.starts_with("retrained_model_"));
    assert!(result.artifact.ends_with(".joblib"));
    assert_eq!(result.dropped_unlabeled, 2);
    assert_eq!(result.dropped_incomplete, 1);
    assert!(result.metadata.trained);
    assert_eq!(result.metadata.model_type.as_deref(), Some("RandomForestClassifier"));

    let active = registry.get().unwrap();
    assert!(active.evaluation().is_some());
    assert!(active.training_metrics().is_some());

    let path = dir.path().join(&result.artifact);
    let artifact = ModelArtifact::from_bytes(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(artifact.feature_names.len(), 6);
    assert!(artifact.metrics.is_some());
    assert!(sidecar_path(&path).exists());
}

#[test]
fn test_pipeline_failure_leaves_registry_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ModelRegistry::open(dir.path()).unwrap());
    let pipeline = TrainingPipeline::new(Arc::clone(&registry), small_forest());

    let first = pipeline
        .train_from_csv(&table(&common::labeled_csv(40)), 0.2, 1)
        .unwrap();

    let err = pipeline
        .train_from_csv(&table(&common::labeled_csv(4)), 0.2, 1)
        .unwrap_err();
    assert!(matches!(err, ExoError::InsufficientData(_)));
    assert_eq!(registry.metadata().unwrap().filename, first.artifact);

    let err = pipeline
        .train_from_csv(&table(&common::labeled_csv(40)), 1.5, 1)
        .unwrap_err();
    assert!(matches!(err, ExoError::InvalidParameter { .. }));
    assert_eq!(registry.metadata().unwrap().filename, first.artifact);
}

#[test]
fn test_commit_cancelled_by_load_during_fit() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ModelRegistry::open(dir.path()).unwrap());
    let pipeline = TrainingPipeline::new(Arc::clone(&registry), small_forest());
    let first = pipeline
        .train_from_csv(&table(&common::labeled_csv(30)), 0.2, 3)
        .unwrap();
    let uploaded = std::fs::read(dir.path().join(&first.artifact)).unwrap();

    let staged = pipeline
        .stage(&table(&common::labeled_csv(40)), 0.2, 4)
        .unwrap();
    registry.load(&uploaded, "uploaded.joblib").unwrap();

    let err = pipeline.commit(staged).unwrap_err();
    assert!(matches!(err, ExoError::Cancelled(_)));
    assert_eq!(registry.metadata().unwrap().filename, "uploaded.joblib");
    assert!(registry.is_loaded());

    let retrained = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with("retrained_model_") && name.ends_with(".joblib")
        })
        .count();
    assert_eq!(retrained, 1);
}

#[test]
fn test_commit_cancelled_by_remove_during_fit() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ModelRegistry::open(dir.path()).unwrap());
    let pipeline = TrainingPipeline::new(Arc::clone(&registry), small_forest());
    pipeline
        .train_from_csv(&table(&common::labeled_csv(30)), 0.2, 3)
        .unwrap();

    let staged = pipeline
        .stage(&table(&common::labeled_csv(30)), 0.2, 5)
        .unwrap();
    registry.remove().unwrap();

    assert!(matches!(pipeline.commit(staged), Err(ExoError::Cancelled(_))));
    assert!(!registry.is_loaded());
    assert!(registry.metadata().is_none());
}
