//! ExoVision HTTP server
//!
//! REST API over the model registry, inference, explainability and
//! retraining services.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use crate::training::TrainingConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub models_dir: String,
    pub max_upload_size: usize,
    /// Model file installed at startup when it exists
    pub initial_model: Option<String>,
    /// Allowed CORS origin; permissive when unset or `*`
    pub cors_origin: Option<String>,
    pub training: TrainingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let models_dir = std::env::var("MODELS_DIR").unwrap_or_else(|_| "./models".to_string());
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            initial_model: Some(
                std::env::var("INITIAL_MODEL")
                    .unwrap_or_else(|_| format!("{}/current_model.joblib", models_dir)),
            ),
            models_dir,
            max_upload_size: std::env::var("MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100 * 1024 * 1024), // 100MB
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty() && o != "*"),
            training: TrainingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Configuration rooted at `models_dir` with no startup model and
    /// nothing read from the environment
    pub fn for_models_dir(models_dir: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            models_dir: models_dir.into(),
            max_upload_size: 100 * 1024 * 1024,
            initial_model: None,
            cors_origin: None,
            training: TrainingConfig::default(),
        }
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn initial_model_path(&self) -> Option<PathBuf> {
        self.initial_model.as_ref().map(PathBuf::from)
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        models_dir = %config.models_dir,
        started_at = %start_time.to_rfc3339(),
        "Initializing model registry"
    );

    let state = Arc::new(AppState::new(config.clone())?);
    if let Err(e) = state.load_initial_model() {
        warn!(error = %e, "Startup model could not be loaded, starting without a model");
    }
    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        host = %config.host,
        port = config.port,
        address = %addr,
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        "ExoVision API starting"
    );
    info!(url = %format!("http://{}/api", addr), "REST API available");
    info!(url = %format!("http://{}/health", addr), "Health endpoint available");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    // Graceful shutdown on ctrl+c
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
        let stop_time = chrono::Utc::now();
        let uptime = stop_time.signed_duration_since(start_time);
        info!(
            stopped_at = %stop_time.to_rfc3339(),
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_for_models_dir() {
        let config = ServerConfig::for_models_dir("/tmp/models");
        assert_eq!(config.models_dir, "/tmp/models");
        assert_eq!(config.max_upload_size, 100 * 1024 * 1024);
        assert!(config.initial_model_path().is_none());
        assert_eq!(config.training.n_estimators, 100);
    }
}
