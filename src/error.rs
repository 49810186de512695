//! Error types for the ExoVision service

use thiserror::Error;

/// Result type alias for ExoVision operations
pub type Result<T> = std::result::Result<T, ExoError>;

/// Main error type shared by the registry, the services and the pipeline.
///
/// Every variant is a kind callers can branch on; the HTTP layer maps kinds
/// to status codes without inspecting messages.
#[derive(Error, Debug)]
pub enum ExoError {
    #[error("Unsupported model format '{extension}'. Allowed formats: {allowed}")]
    UnsupportedFormat { extension: String, allowed: String },

    #[error("No model loaded. Please upload a model first.")]
    ModelNotLoaded,

    #[error("Missing required feature: {0}")]
    MissingFeature(String),

    #[error("Invalid value for feature {name}: {reason}")]
    InvalidFeatureValue { name: String, reason: String },

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Invalid tabular data: {0}")]
    InvalidTabularFormat(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Class imbalance: {0}")]
    ClassImbalance(String),

    #[error("Model does not support {0}")]
    NotSupported(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("Training cancelled: {0}")]
    Cancelled(String),

    #[error("Computation error: {0}")]
    InternalComputation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ExoError {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ExoError::UnsupportedFormat { .. } => "unsupported_format",
            ExoError::ModelNotLoaded => "model_not_loaded",
            ExoError::MissingFeature(_) => "missing_feature",
            ExoError::InvalidFeatureValue { .. } => "invalid_feature_value",
            ExoError::MissingColumns(_) => "missing_columns",
            ExoError::InvalidTabularFormat(_) => "invalid_tabular_format",
            ExoError::InsufficientData(_) => "insufficient_data",
            ExoError::ClassImbalance(_) => "class_imbalance",
            ExoError::NotSupported(_) => "not_supported",
            ExoError::InvalidParameter { .. } => "invalid_parameter",
            ExoError::InvalidArtifact(_) => "invalid_artifact",
            ExoError::Cancelled(_) => "cancelled",
            ExoError::InternalComputation(_) => "internal_computation_error",
            ExoError::Io(_) => "io",
            ExoError::Serialization(_) => "serialization",
        }
    }

    /// Whether the error was caused by the caller's input rather than by the service
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExoError::UnsupportedFormat { .. }
                | ExoError::ModelNotLoaded
                | ExoError::MissingFeature(_)
                | ExoError::InvalidFeatureValue { .. }
                | ExoError::MissingColumns(_)
                | ExoError::InvalidTabularFormat(_)
                | ExoError::InsufficientData(_)
                | ExoError::ClassImbalance(_)
                | ExoError::NotSupported(_)
                | ExoError::InvalidParameter { .. }
        )
    }
}

impl From<polars::error::PolarsError> for ExoError {
    fn from(err: polars::error::PolarsError) -> Self {
        ExoError::InvalidTabularFormat(err.to_string())
    }
}

impl From<serde_json::Error> for ExoError {
    fn from(err: serde_json::Error) -> Self {
        ExoError::Serialization(err.to_string())
    }
}
