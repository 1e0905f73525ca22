use std::io;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{future, stream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::io::ReaderStream;

use crate::auth::require_access_token;
use crate::error::{error_response, GatewayError};
use crate::models::chat::{AskRequest, ModelsResponse};
use crate::AppState;

/// Bytes the pipe between dispatch and response body holds before the
/// relay has to wait for the client.
const STREAM_BUFFER: usize = 8 * 1024;

enum FirstEvent {
    Finished(Result<Result<(), GatewayError>, JoinError>),
    Streaming,
    Drained,
}

/// POST /v1/chat - stream a worker's answer to a question
async fn ask(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, "bad_request_body", &rejection.body_text());
        }
    };

    let (mut writer, reader) = tokio::io::duplex(STREAM_BUFFER);
    let dispatcher = state.dispatcher.clone();
    let mut task = tokio::spawn(async move {
        dispatcher
            .ask(&request.question, &request.model_name, request.parameters, &mut writer)
            .await
    });

    // Hold the response until the dispatch either fails or produces its
    // first byte, so early failures still get a proper status. Bytes
    // already in the pipe commit the response to streaming.
    let mut reader = BufReader::new(reader);
    let first = tokio::select! {
        biased;
        filled = reader.fill_buf() => match filled {
            Ok(buf) if !buf.is_empty() => FirstEvent::Streaming,
            _ => FirstEvent::Drained,
        },
        joined = &mut task => FirstEvent::Finished(joined),
    };

    let outcome = match first {
        FirstEvent::Finished(joined) => joined,
        FirstEvent::Drained => task.await,
        FirstEvent::Streaming => return stream_response(reader, Some(task)),
    };

    match outcome {
        Ok(Ok(())) => stream_response(reader, None),
        Ok(Err(e)) => e.into_response(),
        Err(e) => GatewayError::Internal(e.to_string()).into_response(),
    }
}

/// Stream `reader` as the response body. When `task` is still running, its
/// failure ends the body with an error so the client sees an aborted
/// response rather than a short one.
fn stream_response<R>(
    reader: R,
    task: Option<JoinHandle<Result<(), GatewayError>>>,
) -> Response
where
    R: tokio::io::AsyncRead + Send + 'static,
{
    let tail = stream::once(async move {
        let task = task?;
        let err = match task.await {
            Ok(Ok(())) => return None,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Stream ended with error");
                io::Error::other(e.public_message())
            }
            Err(e) => {
                tracing::error!(error = %e, "Dispatch task failed");
                io::Error::other(e)
            }
        };
        Some(Err::<Bytes, io::Error>(err))
    })
    .filter_map(future::ready);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(ReaderStream::new(reader).chain(tail)),
    )
        .into_response()
}

/// GET|POST /v1/chat/models - models currently in the directory
async fn models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        data: state.dispatcher.all_models(),
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat", post(ask))
        .route("/v1/chat/models", get(models).post(models))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_access_token))
        .with_state(state)
}
