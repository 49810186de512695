//! Application state management

use super::ServerConfig;
use crate::error::Result;
use crate::explainability::{ExplainabilityService, SvgChartRenderer};
use crate::inference::InferenceService;
use crate::registry::{ModelMetadata, ModelRegistry};
use crate::training::TrainingPipeline;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub registry: Arc<ModelRegistry>,
    pub inference: InferenceService,
    pub explainability: ExplainabilityService,
    pub training: Arc<TrainingPipeline>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let registry = Arc::new(ModelRegistry::open(&config.models_dir)?);
        Ok(Self {
            inference: InferenceService::new(Arc::clone(&registry)),
            explainability: ExplainabilityService::new(
                Arc::clone(&registry),
                Arc::new(SvgChartRenderer::default()),
            ),
            training: Arc::new(TrainingPipeline::new(Arc::clone(&registry), config.training.clone())),
            registry,
            config,
            started_at: Utc::now(),
        })
    }

    /// Install the configured startup model if its file exists
    pub fn load_initial_model(&self) -> Result<Option<ModelMetadata>> {
        let Some(path) = self.config.initial_model_path() else {
            return Ok(None);
        };
        if !path.exists() {
            info!(path = %path.display(), "No startup model found");
            return Ok(None);
        }
        let metadata = self.registry.load_path(&path)?;
        Ok(Some(metadata))
    }
}
