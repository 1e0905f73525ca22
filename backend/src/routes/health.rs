use std::fmt::Write;
use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use axum::response::{IntoResponse, Response};
use axum::http::{header, StatusCode};
use serde::Serialize;

use crate::gateway::RefreshStatus;
use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    directory: RefreshStatus,
}

/// Degraded while the latest directory refresh failed; the stale snapshot still serves.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let directory = state.dispatcher.directory().refresh_status();
    let status = if directory.consecutive_failures == 0 {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        directory,
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let version = env!("CARGO_PKG_VERSION");
    let admission = state.dispatcher.admission();
    let refresh = state.dispatcher.directory().refresh_status();
    let last_success = refresh
        .last_success_at
        .map(|t| t.timestamp())
        .unwrap_or(0);

    let mut body = format!(
        "# HELP gateway_up Whether the service is up\n\
         # TYPE gateway_up gauge\n\
         gateway_up 1\n\
         # HELP gateway_info Service information\n\
         # TYPE gateway_info gauge\n\
         gateway_info{{version=\"{}\"}} 1\n",
        version
    );
    let gauges = [
        ("gateway_admission_capacity", "Maximum concurrent dispatches", admission.capacity() as i64),
        ("gateway_admission_in_flight", "Dispatches currently admitted", admission.in_flight() as i64),
        ("gateway_directory_models", "Models in the current directory snapshot", refresh.model_count as i64),
        (
            "gateway_directory_refresh_failures",
            "Consecutive failed directory refreshes",
            refresh.consecutive_failures as i64,
        ),
        (
            "gateway_directory_last_success_timestamp_seconds",
            "Unix time of the last successful directory refresh",
            last_success,
        ),
    ];
    for (name, help, value) in gauges {
        let _ = write!(body, "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n");
    }

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}
