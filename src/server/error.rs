//! Error types for the server

use crate::error::ExoError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Domain(#[from] ExoError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, &'static str, String) {
        match self {
            ServerError::Domain(e) if e.is_validation() => (StatusCode::BAD_REQUEST, e.kind(), e.to_string()),
            ServerError::Domain(e @ ExoError::Cancelled(_)) => (StatusCode::CONFLICT, e.kind(), e.to_string()),
            ServerError::Domain(e @ ExoError::InvalidArtifact(_)) => {
                tracing::error!(detail = %e, "Model could not be loaded");
                (StatusCode::INTERNAL_SERVER_ERROR, e.kind(), format!("Error loading model: {}", e))
            }
            ServerError::Domain(e @ ExoError::InternalComputation(_)) => {
                tracing::error!(detail = %e, "Model computation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.kind(), e.to_string())
            }
            ServerError::Domain(e) => {
                tracing::error!(detail = %e, kind = e.kind(), "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, e.kind(), "An internal error occurred".to_string())
            }
            ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ServerError::Internal(msg) => {
                tracing::error!(detail = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", "An internal error occurred".to_string())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.status_and_message();

        let body = Json(json!({
            "error": true,
            "kind": kind,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ExoError::ModelNotLoaded, StatusCode::BAD_REQUEST),
            (ExoError::MissingColumns(vec!["koi_score".into()]), StatusCode::BAD_REQUEST),
            (ExoError::NotSupported("x".into()), StatusCode::BAD_REQUEST),
            (ExoError::Cancelled("x".into()), StatusCode::CONFLICT),
            (ExoError::InvalidArtifact("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ExoError::InternalComputation("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let response = ServerError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_io_details_are_not_exposed() {
        let err = ServerError::from(ExoError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "/secret/path",
        )));
        let (_, _, message) = err.status_and_message();
        assert!(!message.contains("/secret/path"));
    }
}
