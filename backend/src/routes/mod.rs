pub mod chat;
pub mod health;

use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::error_response;
use crate::logging::request_logger;
use crate::AppState;

/// The full HTTP surface.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router(state.clone()))
        .merge(chat::router(state))
        .fallback(not_found)
        .layer(middleware::map_response(method_not_allowed))
        .layer(middleware::from_fn(request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "page_not_found", "page not found")
}

/// Give axum's bare 405 the usual error body, keeping its `Allow` header.
async fn method_not_allowed(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }

    let mut replaced = error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        "method not allowed",
    );
    if let Some(allow) = response.headers().get(header::ALLOW) {
        replaced.headers_mut().insert(header::ALLOW, allow.clone());
    }
    replaced
}
