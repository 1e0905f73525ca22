//! Error types for the gateway boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::gateway::{AdmissionRejected, DirectoryError, RelayError, TransportError};
use crate::moderation::ModerationError;

/// Errors surfaced by a dispatch, each mapping to one gateway status class.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("Question rejected by moderation")]
    ModerationRejected,

    #[error("Too many concurrent requests")]
    CapacityExhausted,

    #[error("Worker registry unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Dispatch to worker failed: {0}")]
    DispatchFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Status code and machine-readable type for the response body.
    pub fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            GatewayError::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request_param"),
            GatewayError::ModerationRejected => (StatusCode::BAD_REQUEST, "sensitive_content"),
            GatewayError::CapacityExhausted => (StatusCode::TOO_MANY_REQUESTS, "too_many_requests"),
            GatewayError::UpstreamUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
            }
            GatewayError::DispatchFailure(_) => (StatusCode::BAD_GATEWAY, "dispatch_failed"),
            GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }

    /// Message safe to show a client. Upstream detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Validation(msg) => msg.clone(),
            GatewayError::UpstreamUnavailable(_) => "model directory unavailable".to_string(),
            GatewayError::DispatchFailure(_) => "inference worker failed".to_string(),
            GatewayError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<AdmissionRejected> for GatewayError {
    fn from(_: AdmissionRejected) -> Self {
        GatewayError::CapacityExhausted
    }
}

impl From<DirectoryError> for GatewayError {
    fn from(err: DirectoryError) -> Self {
        GatewayError::UpstreamUnavailable(err.to_string())
    }
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Client(e) => GatewayError::Internal(e.to_string()),
            other => GatewayError::DispatchFailure(other.to_string()),
        }
    }
}

impl From<RelayError> for GatewayError {
    fn from(err: RelayError) -> Self {
        GatewayError::DispatchFailure(err.to_string())
    }
}

impl From<ModerationError> for GatewayError {
    fn from(err: ModerationError) -> Self {
        match err {
            ModerationError::Rejected { .. } => GatewayError::ModerationRejected,
            other => GatewayError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        error_response(status, error_type, &self.public_message())
    }
}

/// Build the JSON error body used for every failed request.
pub fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    let body = Json(json!({
        "error": {
            "type": error_type,
            "message": message
        }
    }));

    (status, body).into_response()
}

pub type Result<T> = std::result::Result<T, GatewayError>;
