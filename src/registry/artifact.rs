//! Model artifacts on disk
//!
//! Native artifacts (`.pkl`, `.joblib`) are JSON documents holding a
//! [`Classifier`] together with the feature ordering it was fitted on.
//! Models produced by the training pipeline also get a `.meta.json`
//! sidecar with their evaluation metrics and importance ranking.

use crate::error::{ExoError, Result};
use crate::features::{FEATURE_COUNT, FEATURE_NAMES};
use crate::training::{Classifier, Evaluation, FeatureWeight, TrainingMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extensions accepted by [`ModelFormat::from_filename`]
pub const ALLOWED_EXTENSIONS: [&str; 5] = [".pkl", ".joblib", ".h5", ".pt", ".pth"];

/// Current artifact layout version
pub const ARTIFACT_VERSION: u32 = 1;

/// Format tag derived from a model file's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Pkl,
    Joblib,
    H5,
    Pt,
    Pth,
}

impl ModelFormat {
    /// Resolve the format from a filename, ignoring case.
    pub fn from_filename(filename: &str) -> Result<Self> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();

        match extension.as_str() {
            ".pkl" => Ok(ModelFormat::Pkl),
            ".joblib" => Ok(ModelFormat::Joblib),
            ".h5" => Ok(ModelFormat::H5),
            ".pt" => Ok(ModelFormat::Pt),
            ".pth" => Ok(ModelFormat::Pth),
            _ => Err(ExoError::UnsupportedFormat {
                extension: if extension.is_empty() { "(none)".to_string() } else { extension },
                allowed: ALLOWED_EXTENSIONS.join(", "),
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ModelFormat::Pkl => ".pkl",
            ModelFormat::Joblib => ".joblib",
            ModelFormat::H5 => ".h5",
            ModelFormat::Pt => ".pt",
            ModelFormat::Pth => ".pth",
        }
    }

    /// Whether files of this format can be decoded into a classifier
    pub fn is_loadable(&self) -> bool {
        matches!(self, ModelFormat::Pkl | ModelFormat::Joblib)
    }
}

/// Serialized classifier with its input schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub feature_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub classifier: Classifier,
    #[serde(default)]
    pub evaluation: Option<Evaluation>,
    #[serde(default)]
    pub metrics: Option<TrainingMetrics>,
}

impl ModelArtifact {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            version: ARTIFACT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            created_at: Utc::now(),
            classifier,
            evaluation: None,
            metrics: None,
        }
    }

    pub fn with_evaluation(mut self, evaluation: Evaluation) -> Self {
        self.evaluation = Some(evaluation);
        self
    }

    pub fn with_metrics(mut self, metrics: TrainingMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and check that the artifact was fitted on this feature schema
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let artifact: Self = serde_json::from_slice(bytes)
            .map_err(|e| ExoError::InvalidArtifact(format!("cannot decode model: {}", e)))?;

        if artifact.version > ARTIFACT_VERSION {
            return Err(ExoError::InvalidArtifact(format!(
                "artifact version {} is newer than supported version {}",
                artifact.version, ARTIFACT_VERSION
            )));
        }
        if artifact.feature_names != FEATURE_NAMES {
            return Err(ExoError::InvalidArtifact(format!(
                "feature ordering [{}] does not match [{}]",
                artifact.feature_names.join(", "),
                FEATURE_NAMES.join(", ")
            )));
        }
        artifact.classifier.validate()?;
        if artifact.classifier.n_features() != FEATURE_COUNT {
            return Err(ExoError::InvalidArtifact(format!(
                "classifier was fitted on {} features, expected {}",
                artifact.classifier.n_features(),
                FEATURE_COUNT
            )));
        }
        Ok(artifact)
    }
}

/// Statistics written next to a trained artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSidecar {
    pub artifact: String,
    pub model_type: String,
    pub feature_names: Vec<String>,
    pub metrics: TrainingMetrics,
    pub feature_importance: Vec<FeatureWeight>,
    pub created_at: DateTime<Utc>,
}

/// A file written by the store
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
}

/// Directory holding uploaded and trained model files
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` under the base name of `filename`, replacing any file
    /// of the same name.
    pub fn write(&self, filename: &str, bytes: &[u8]) -> Result<StoredFile> {
        let name = sanitize_filename(filename)?;
        let path = self.dir.join(&name);
        write_atomic(&path, bytes)?;
        debug!(path = %path.display(), size = bytes.len(), "Stored model file");
        Ok(StoredFile {
            path,
            filename: name,
            size: bytes.len() as u64,
        })
    }

    /// Persist a trained model as `retrained_model_<timestamp>.joblib` plus sidecar
    pub fn save_trained(
        &self,
        artifact: &ModelArtifact,
        importance: &[FeatureWeight],
    ) -> Result<StoredFile> {
        let stem = format!("retrained_model_{}", artifact.created_at.format("%Y%m%d_%H%M%S"));
        let mut filename = format!("{}.joblib", stem);
        let mut n = 1;
        while self.dir.join(&filename).exists() {
            filename = format!("{}_{}.joblib", stem, n);
            n += 1;
        }
        let path = self.dir.join(&filename);
        let size = write_trained(&path, artifact, importance)?;
        Ok(StoredFile { path, filename, size })
    }
}

/// Write a trained artifact and its sidecar to `path`. Returns the artifact size.
pub fn write_trained(path: &Path, artifact: &ModelArtifact, importance: &[FeatureWeight]) -> Result<u64> {
    let bytes = artifact.to_bytes()?;
    write_atomic(path, &bytes)?;

    if let Some(metrics) = &artifact.metrics {
        let sidecar = ArtifactSidecar {
            artifact: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            model_type: artifact.classifier.type_name().to_string(),
            feature_names: artifact.feature_names.clone(),
            metrics: metrics.clone(),
            feature_importance: importance.to_vec(),
            created_at: artifact.created_at,
        };
        write_atomic(&sidecar_path(path), &serde_json::to_vec_pretty(&sidecar)?)?;
    }

    Ok(bytes.len() as u64)
}

/// `model.joblib` -> `model.meta.json`
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    artifact.with_extension("meta.json")
}

pub(crate) fn sanitize_filename(filename: &str) -> Result<String> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_string();
    if name.is_empty() || name.starts_with('.') {
        return Err(ExoError::InvalidParameter {
            name: "filename".to_string(),
            value: filename.to_string(),
            reason: "not a usable file name".to_string(),
        });
    }
    Ok(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".partial");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
