//! Shared access-token check for the chat routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::error_response;
use crate::AppState;

/// Header carrying the access token.
pub const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("access token is missing")]
    MissingToken,
    #[error("access token is invalid")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let error_type = match self {
            AuthError::MissingToken => "access_token_missing",
            AuthError::InvalidToken => "access_token_invalid",
        };
        error_response(StatusCode::UNAUTHORIZED, error_type, &self.to_string())
    }
}

/// Compare the request's token header with `expected`. No expected token means open access.
pub fn check_token(headers: &HeaderMap, expected: Option<&str>) -> Result<(), AuthError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingToken)?;

    if token != expected {
        return Err(AuthError::InvalidToken);
    }
    Ok(())
}

/// Middleware rejecting requests without the configured access token.
pub async fn require_access_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(e) = check_token(request.headers(), state.config.auth.access_token.as_deref()) {
        tracing::debug!(error = %e, path = %request.uri().path(), "Rejected request");
        return e.into_response();
    }
    next.run(request).await
}
