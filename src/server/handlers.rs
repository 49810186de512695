//! Request handlers

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Multipart, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::error::{Result, ServerError};
use super::state::AppState;
use crate::error::ExoError;
use crate::features::{record_from_json, validate_ranges, FeatureVector, FEATURE_DISPLAY_NAMES, FEATURE_NAMES};
use crate::inference::PredictionResult;
use crate::tabular::TabularData;

const TRAINING_TEMPLATE_CSV: &str = "\
orbital_period,transit_duration,transit_depth,planet_radius,signal_to_noise,koi_score,label
54.32,3.45,0.0012,1.8,15.6,0.85,1
89.76,4.21,0.0018,2.3,22.4,0.92,1
12.45,2.11,0.0008,1.2,8.9,0.45,0
145.67,5.67,0.0025,3.1,28.7,0.95,1
23.89,2.89,0.0009,1.5,11.2,0.52,0
67.34,3.78,0.0015,2.0,18.3,0.78,1
98.12,4.56,0.0020,2.5,25.1,0.88,1
34.56,3.12,0.0011,1.6,13.4,0.61,0
156.78,6.23,0.0028,3.4,31.2,0.97,1
45.23,3.34,0.0013,1.9,16.8,0.73,1
";

const PREDICTION_SAMPLE_CSV: &str = "\
orbital_period,transit_duration,transit_depth,planet_radius,signal_to_noise,koi_score
365.25,3.5,1000.0,1.2,15.5,0.85
12.45,2.11,0.0008,1.2,8.9,0.45
89.76,4.21,0.0018,2.3,22.4,0.92
23.89,2.89,0.0009,1.5,11.2,0.52
";

/// An uploaded file from a multipart body
struct Upload {
    filename: String,
    data: Bytes,
}

/// First multipart field that carries a file name
async fn read_upload(multipart: &mut Multipart) -> Result<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;
        info!(file = %filename, bytes = data.len(), "Received upload");
        return Ok(Upload { filename, data });
    }

    Err(ServerError::BadRequest("No file uploaded".to_string()))
}

fn require_csv(upload: &Upload) -> Result<TabularData> {
    let is_csv = Path::new(&upload.filename)
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(ServerError::BadRequest("File must be a CSV".to_string()));
    }
    Ok(TabularData::from_csv_bytes(&upload.data)?)
}

/// JSON object body; non-numeric fields outside the schema are ignored
type JsonRecord = serde_json::Map<String, serde_json::Value>;

fn build_vector(object: &JsonRecord) -> Result<FeatureVector> {
    let record = record_from_json(object)?;
    let vector = FeatureVector::build(&record)?;
    validate_ranges(&vector)?;
    Ok(vector)
}

// ============================================================================
// Service info
// ============================================================================

pub async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "ExoVision API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "operational",
        "model_loaded": state.registry.is_loaded(),
    }))
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_secs": (chrono::Utc::now() - state.started_at).num_seconds(),
        "model_status": if state.registry.is_loaded() { "loaded" } else { "not_loaded" },
    }))
}

// ============================================================================
// Model lifecycle
// ============================================================================

pub async fn upload_model(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let upload = read_upload(&mut multipart).await?;

    let registry = Arc::clone(&state.registry);
    let metadata = tokio::task::spawn_blocking(move || registry.load(&upload.data, &upload.filename))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;

    Ok(Json(json!({
        "message": "Model uploaded successfully",
        "metadata": metadata,
    })))
}

pub async fn model_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "loaded": state.registry.is_loaded(),
        "metadata": state.registry.metadata(),
    }))
}

pub async fn delete_model(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    match state.registry.remove() {
        Ok(metadata) => Ok(Json(json!({
            "message": "Model removed successfully",
            "metadata": metadata,
        }))),
        Err(ExoError::ModelNotLoaded) => Err(ServerError::NotFound("No model loaded".to_string())),
        Err(e) => Err(e.into()),
    }
}

pub async fn model_stats(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let model = state.registry.get().ok();
    Json(json!({
        "loaded": model.is_some(),
        "metadata": state.registry.metadata(),
        "predictions": state.inference.ledger(),
        "training_metrics": model.as_ref().and_then(|m| m.training_metrics()),
    }))
}

// ============================================================================
// Inference
// ============================================================================

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(record): Json<JsonRecord>,
) -> Result<Json<PredictionResult>> {
    let vector = build_vector(&record)?;
    Ok(Json(state.inference.predict_one(&vector)?))
}

#[derive(Deserialize)]
pub struct BatchRequest {
    data: Vec<JsonRecord>,
}

pub async fn predict_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<serde_json::Value>> {
    let vectors = request
        .data
        .iter()
        .map(build_vector)
        .collect::<Result<Vec<_>>>()?;
    let predictions = state.inference.predict_batch(&vectors)?;

    Ok(Json(json!({
        "count": predictions.len(),
        "predictions": predictions,
    })))
}

pub async fn predict_csv(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let upload = read_upload(&mut multipart).await?;
    let table = require_csv(&upload)?;
    let result = state.inference.predict_tabular(&table)?;

    Ok(Json(json!({
        "filename": upload.filename,
        "predictions": result.predictions,
        "summary": result.summary,
    })))
}

// ============================================================================
// Explainability
// ============================================================================

pub async fn feature_importance(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let report = state
        .explainability
        .feature_importance(&FEATURE_NAMES, &FEATURE_DISPLAY_NAMES)?;
    Ok(Json(serde_json::to_value(report).map_err(ExoError::from)?))
}

/// Per-feature contributions to the prediction for one record
pub async fn shap_values(
    State(state): State<Arc<AppState>>,
    Json(record): Json<JsonRecord>,
) -> Result<Json<serde_json::Value>> {
    let vector = build_vector(&record)?;
    let explanation = state
        .explainability
        .local_explanation(&vector, &FEATURE_NAMES, &FEATURE_DISPLAY_NAMES)?;
    Ok(Json(serde_json::to_value(explanation).map_err(ExoError::from)?))
}

pub async fn confusion_matrix(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>> {
    let report = state.explainability.confusion_matrix()?;
    Ok(Json(serde_json::to_value(report).map_err(ExoError::from)?))
}

// ============================================================================
// Training
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RetrainParams {
    test_size: Option<f64>,
    #[serde(alias = "random_state")]
    seed: Option<u64>,
}

pub async fn retrain(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RetrainParams>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let upload = read_upload(&mut multipart).await?;
    let table = require_csv(&upload)?;

    let defaults = state.training.config();
    let test_size = params.test_size.unwrap_or(defaults.test_size);
    let seed = params.seed.unwrap_or(defaults.random_state);

    let result = Arc::clone(&state.training)
        .train_in_background(table, test_size, seed)
        .await?;

    Ok(Json(json!({
        "message": "Model retrained successfully",
        "metrics": result.metrics,
        "feature_importance": result.feature_importance,
        "artifact": result.artifact,
        "model_info": result.metadata,
        "dropped_rows": {
            "incomplete": result.dropped_incomplete,
            "unlabeled": result.dropped_unlabeled,
        },
    })))
}

// ============================================================================
// Templates
// ============================================================================

pub async fn download_template() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=exoplanet_training_template.csv",
            ),
        ],
        TRAINING_TEMPLATE_CSV,
    )
}

pub async fn download_prediction_sample() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=exoplanet_prediction_sample.csv",
            ),
        ],
        PREDICTION_SAMPLE_CSV,
    )
}
