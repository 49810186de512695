//! ExoVision - exoplanet candidate classification
//!
//! This crate classifies Kepler Objects of Interest as confirmed planets or
//! false positives from six transit features, and serves the classifier over
//! HTTP.
//!
//! # Modules
//!
//! ## Data
//! - [`features`] - Feature schema and fixed-order vectors
//! - [`tabular`] - CSV ingestion
//!
//! ## Models
//! - [`training`] - Classifiers, metrics and the retraining pipeline
//! - [`registry`] - Active model ownership and artifact persistence
//! - [`inference`] - Single, batch and tabular prediction
//! - [`explainability`] - Feature importance, confusion matrix and per-prediction reports
//!
//! ## Services
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod features;
pub mod tabular;

// Models
pub mod training;
pub mod registry;
pub mod inference;
pub mod explainability;

// Services
pub mod server;
pub mod cli;

pub use error::{ExoError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ExoError, Result};

    // Features
    pub use crate::features::{FeatureRecord, FeatureVector, FEATURE_NAMES};
    pub use crate::tabular::TabularData;

    // Training
    pub use crate::training::{Classifier, ModelType, TrainingConfig, TrainingPipeline, TrainingResult};

    // Registry
    pub use crate::registry::{ModelArtifact, ModelMetadata, ModelRegistry};

    // Inference
    pub use crate::inference::{InferenceService, Label, PredictionResult};

    // Explainability
    pub use crate::explainability::{ExplainabilityService, SvgChartRenderer};

    // Server
    pub use crate::server::{create_router, run_server, AppState, ServerConfig};
}
