//! Active model registry
//!
//! Holds the single active classifier and its metadata as one unit behind
//! an `Arc`. Readers clone the `Arc` once per request and never observe a
//! model paired with another model's metadata. Writers (load, remove, swap)
//! serialize on a separate gate so the read lock is only held for the
//! pointer exchange itself.

mod artifact;

use artifact::sanitize_filename;

pub use artifact::{
    sidecar_path, write_trained, ArtifactSidecar, ArtifactStore, ModelArtifact, ModelFormat,
    StoredFile, ALLOWED_EXTENSIONS, ARTIFACT_VERSION,
};

use crate::error::{ExoError, Result};
use crate::training::{Capabilities, Classifier, Evaluation, TrainingMetrics};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Description of the installed model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub filename: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub format: ModelFormat,
    /// Classifier type name, absent for stored-only formats
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    /// `true` when produced by the training pipeline
    pub trained: bool,
    pub inference_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A decoded classifier ready for inference
#[derive(Debug)]
pub struct LoadedModel {
    classifier: Classifier,
    capabilities: Capabilities,
    evaluation: Option<Evaluation>,
    training_metrics: Option<TrainingMetrics>,
}

impl LoadedModel {
    pub fn new(classifier: Classifier) -> Self {
        let capabilities = classifier.capabilities();
        Self {
            classifier,
            capabilities,
            evaluation: None,
            training_metrics: None,
        }
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        let mut model = Self::new(artifact.classifier);
        model.evaluation = artifact.evaluation;
        model.training_metrics = artifact.metrics;
        model
    }

    pub fn with_evaluation(mut self, evaluation: Evaluation) -> Self {
        self.evaluation = Some(evaluation);
        self
    }

    pub fn with_training_metrics(mut self, metrics: TrainingMetrics) -> Self {
        self.training_metrics = Some(metrics);
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Held-out labels recorded when the model was trained
    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    pub fn training_metrics(&self) -> Option<&TrainingMetrics> {
        self.training_metrics.as_ref()
    }
}

/// Metadata and, for loadable formats, the decoded model
#[derive(Debug)]
pub struct ActiveModel {
    pub metadata: ModelMetadata,
    pub model: Option<Arc<LoadedModel>>,
}

/// Owner of the single active model
pub struct ModelRegistry {
    store: ArtifactStore,
    active: RwLock<Option<Arc<ActiveModel>>>,
    writer: Mutex<()>,
    /// Bumped by every load and remove. Training compares it before swapping.
    epoch: AtomicU64,
}

impl ModelRegistry {
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            active: RwLock::new(None),
            writer: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Registry backed by a models directory, created if missing
    pub fn open(models_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(ArtifactStore::open(models_dir)?))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Store an uploaded model file and make it the active model.
    ///
    /// The extension is checked and the bytes decoded before anything
    /// touches the disk. A loadable file that fails to decode leaves both the
    /// registry and any stored file of the same name unchanged.
    pub fn load(&self, bytes: &[u8], filename: &str) -> Result<ModelMetadata> {
        let format = ModelFormat::from_filename(filename)?;
        let name = sanitize_filename(filename)?;

        let _gate = self.writer.lock();
        let active = decode(format, bytes, &name, bytes.len() as u64).map_err(|e| {
            warn!(file = %name, error = %e, "Uploaded model could not be loaded");
            e
        })?;
        self.store.write(&name, bytes)?;
        Ok(self.install(active))
    }

    /// Make an existing file the active model without copying it
    pub fn load_path(&self, path: &Path) -> Result<ModelMetadata> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let format = ModelFormat::from_filename(&filename)?;
        let bytes = std::fs::read(path)?;

        let _gate = self.writer.lock();
        let active = decode(format, &bytes, &filename, bytes.len() as u64)?;
        Ok(self.install(active))
    }

    fn install(&self, active: ActiveModel) -> ModelMetadata {
        let metadata = active.metadata.clone();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.active.write() = Some(Arc::new(active));
        info!(
            file = %metadata.filename,
            model_type = metadata.model_type.as_deref().unwrap_or("unknown"),
            inference = metadata.inference_available,
            "Model installed"
        );
        metadata
    }

    /// Snapshot of the active entry
    pub fn snapshot(&self) -> Option<Arc<ActiveModel>> {
        self.active.read().clone()
    }

    /// The active model, if one is loaded and usable for inference
    pub fn get(&self) -> Result<Arc<LoadedModel>> {
        self.snapshot()
            .and_then(|active| active.model.clone())
            .ok_or(ExoError::ModelNotLoaded)
    }

    pub fn metadata(&self) -> Option<ModelMetadata> {
        self.snapshot().map(|active| active.metadata.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.get().is_ok()
    }

    /// Clear the active entry. Fails when nothing is installed.
    pub fn remove(&self) -> Result<ModelMetadata> {
        let _gate = self.writer.lock();
        let removed = self.active.write().take().ok_or(ExoError::ModelNotLoaded)?;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        info!(file = %removed.metadata.filename, "Model removed");
        Ok(removed.metadata.clone())
    }

    /// Install a model unconditionally. Training goes through
    /// [`ModelRegistry::swap_if_current`] instead.
    pub fn swap(&self, model: LoadedModel, metadata: ModelMetadata) {
        let _gate = self.writer.lock();
        self.replace(model, metadata);
    }

    /// Install a trained model unless a load or remove happened since `epoch`
    /// was read. Among concurrent trainings the last to finish wins.
    pub fn swap_if_current(&self, epoch: u64, model: LoadedModel, metadata: ModelMetadata) -> Result<()> {
        let _gate = self.writer.lock();
        self.ensure_current(epoch)?;
        self.replace(model, metadata);
        Ok(())
    }

    fn replace(&self, model: LoadedModel, metadata: ModelMetadata) {
        info!(file = %metadata.filename, model_type = ?metadata.model_type, "Model swapped in");
        *self.active.write() = Some(Arc::new(ActiveModel {
            metadata,
            model: Some(Arc::new(model)),
        }));
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Fail with [`ExoError::Cancelled`] if the registry changed since `epoch`
    pub fn ensure_current(&self, epoch: u64) -> Result<()> {
        if self.epoch() != epoch {
            return Err(ExoError::Cancelled(
                "the active model was loaded or removed while training ran".to_string(),
            ));
        }
        Ok(())
    }
}

fn decode(format: ModelFormat, bytes: &[u8], filename: &str, size: u64) -> Result<ActiveModel> {
    let mut metadata = ModelMetadata {
        filename: filename.to_string(),
        size,
        uploaded_at: Utc::now(),
        format,
        model_type: None,
        trained: false,
        inference_available: false,
        note: None,
    };

    if !format.is_loadable() {
        metadata.note = Some(format!(
            "{} files are stored but cannot be used for inference",
            format.extension()
        ));
        return Ok(ActiveModel { metadata, model: None });
    }

    let artifact = ModelArtifact::from_bytes(bytes)?;
    metadata.model_type = Some(artifact.classifier.type_name().to_string());
    metadata.trained = artifact.metrics.is_some();
    metadata.inference_available = true;

    Ok(ActiveModel {
        metadata,
        model: Some(Arc::new(LoadedModel::from_artifact(artifact))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_COUNT;
    use crate::training::DecisionTree;
    use ndarray::{Array1, Array2};

    fn artifact_bytes() -> Vec<u8> {
        let x = Array2::from_shape_fn((6, FEATURE_COUNT), |(r, c)| (r * c) as f64);
        let y = Array1::from_vec(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();
        ModelArtifact::new(Classifier::DecisionTree(tree)).to_bytes().unwrap()
    }

    fn registry() -> (tempfile::TempDir, ModelRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::open(dir.path()).unwrap();
        (dir, registry)
    }

    #[test]
    fn test_empty_registry() {
        let (_dir, registry) = registry();
        assert!(matches!(registry.get(), Err(ExoError::ModelNotLoaded)));
        assert!(registry.metadata().is_none());
        assert!(matches!(registry.remove(), Err(ExoError::ModelNotLoaded)));
    }

    #[test]
    fn test_load_then_remove() {
        let (dir, registry) = registry();
        let meta = registry.load(&artifact_bytes(), "model.joblib").unwrap();
        assert_eq!(meta.model_type.as_deref(), Some("DecisionTreeClassifier"));
        assert!(meta.inference_available);
        assert!(!meta.trained);
        assert!(dir.path().join("model.joblib").exists());
        assert!(registry.get().is_ok());

        let epoch = registry.epoch();
        registry.remove().unwrap();
        assert!(registry.epoch() > epoch);
        assert!(registry.metadata().is_none());
    }

    #[test]
    fn test_stored_only_format() {
        let (_dir, registry) = registry();
        let meta = registry.load(b"\x89HDF", "weights.h5").unwrap();
        assert!(!meta.inference_available);
        assert!(meta.note.is_some());
        assert_eq!(registry.metadata(), Some(meta));
        assert!(matches!(registry.get(), Err(ExoError::ModelNotLoaded)));
    }

    #[test]
    fn test_bad_artifact_keeps_previous_model() {
        let (_dir, registry) = registry();
        registry.load(&artifact_bytes(), "good.pkl").unwrap();
        let err = registry.load(b"garbage", "bad.pkl").unwrap_err();
        assert!(matches!(err, ExoError::InvalidArtifact(_)));
        assert_eq!(registry.metadata().unwrap().filename, "good.pkl");
    }

    #[test]
    fn test_swap_if_current_detects_interleaved_load() {
        let (_dir, registry) = registry();
        let epoch = registry.epoch();
        registry.load(&artifact_bytes(), "uploaded.joblib").unwrap();

        let artifact = ModelArtifact::from_bytes(&artifact_bytes()).unwrap();
        let metadata = ModelMetadata {
            filename: "retrained.joblib".to_string(),
            size: 1,
            uploaded_at: Utc::now(),
            format: ModelFormat::Joblib,
            model_type: Some(artifact.classifier.type_name().to_string()),
            trained: true,
            inference_available: true,
            note: None,
        };
        let result = registry.swap_if_current(epoch, LoadedModel::from_artifact(artifact), metadata);
        assert!(matches!(result, Err(ExoError::Cancelled(_))));
        assert_eq!(registry.metadata().unwrap().filename, "uploaded.joblib");
    }

    fn trained_metadata(filename: &str) -> ModelMetadata {
        ModelMetadata {
            filename: filename.to_string(),
            size: 1,
            uploaded_at: Utc::now(),
            format: ModelFormat::Joblib,
            model_type: Some("DecisionTreeClassifier".to_string()),
            trained: true,
            inference_available: true,
            note: None,
        }
    }

    #[test]
    fn test_failed_load_keeps_stored_file() {
        let (dir, registry) = registry();
        let good = artifact_bytes();
        registry.load(&good, "current_model.joblib").unwrap();

        let err = registry.load(b"garbage", "current_model.joblib").unwrap_err();
        assert!(matches!(err, ExoError::InvalidArtifact(_)));
        assert_eq!(std::fs::read(dir.path().join("current_model.joblib")).unwrap(), good);
        assert!(registry.is_loaded());

        registry.load(b"garbage", "fresh.pkl").unwrap_err();
        assert!(!dir.path().join("fresh.pkl").exists());
    }

    #[test]
    fn test_malformed_tree_is_rejected_on_load() {
        let (dir, registry) = registry();
        registry.load(&artifact_bytes(), "good.joblib").unwrap();

        let mut value: serde_json::Value = serde_json::from_slice(&artifact_bytes()).unwrap();
        value["classifier"]["model"]["root"]["Split"]["feature_idx"] = serde_json::json!(99);
        let crafted = serde_json::to_vec(&value).unwrap();

        let err = registry.load(&crafted, "crafted.joblib").unwrap_err();
        assert!(matches!(err, ExoError::InvalidArtifact(_)));
        assert_eq!(registry.metadata().unwrap().filename, "good.joblib");
        assert!(!dir.path().join("crafted.joblib").exists());
    }

    #[test]
    fn test_swap_installs_without_epoch_check() {
        let (_dir, registry) = registry();
        let stale = registry.epoch();
        registry.load(&artifact_bytes(), "uploaded.joblib").unwrap();
        assert_ne!(registry.epoch(), stale);

        let artifact = ModelArtifact::from_bytes(&artifact_bytes()).unwrap();
        registry.swap(LoadedModel::from_artifact(artifact), trained_metadata("swapped.joblib"));

        let metadata = registry.metadata().unwrap();
        assert_eq!(metadata.filename, "swapped.joblib");
        assert!(metadata.trained);
        assert!(registry.get().is_ok());
    }
}
