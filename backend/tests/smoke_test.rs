use model_gateway::gateway::{HttpWorkerRegistry, WorkerRegistry};
use model_gateway::moderation::{Moderation, PassThrough};
use model_gateway::test_util::{
    spawn_truncating_server, test_config, test_state, RecordingModeration,
};
use model_gateway::{routes, Config};
use std::sync::Arc;
use axum::body::Body;
use http::{Method, Request, StatusCode};
use tower::ServiceExt;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use serde_json::{json, Value};

/// Registry listing `m1` served by the worker at `worker_uri`.
async fn start_registry(worker_uri: &str) -> MockServer {
    let registry = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/refresh_all_workers"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&registry)
        .await;
    Mock::given(method("POST"))
        .and(path("/list_models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": ["m1"]})))
        .mount(&registry)
        .await;
    Mock::given(method("POST"))
        .and(path("/get_worker_address"))
        .and(body_json(json!({"model": "m1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"address": worker_uri})))
        .mount(&registry)
        .await;

    registry
}

async fn create_app(
    config: Config,
    moderation: Arc<dyn Moderation>,
) -> axum::Router {
    let registry: Arc<dyn WorkerRegistry> =
        Arc::new(HttpWorkerRegistry::new(&config.registry).unwrap());
    let state = test_state(config, registry, moderation).await;
    routes::router(state)
}

async fn send_request(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<&str>,
    token: Option<&str>,
) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    if let Some(token) = token {
        builder = builder.header("PRIVATE-TOKEN", token);
    }
    let request = builder
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn error_type(body: &[u8]) -> String {
    let value: Value = serde_json::from_slice(body).unwrap();
    value["error"]["type"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_chat_streams_worker_answer() {
    let worker = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_json(json!({"models": "m1", "prompt": "Hello", "max_new_tokens": 16})))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hi there"))
        .expect(1)
        .mount(&worker)
        .await;
    let registry = start_registry(&worker.uri()).await;

    let app = create_app(test_config(&registry.uri()), Arc::new(PassThrough)).await;
    let (status, body) = send_request(
        &app,
        Method::POST,
        "/v1/chat",
        Some(r#"{"question": "Hello", "model_name": "m1", "max_new_tokens": 16}"#),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"Hi there");
}

#[tokio::test]
async fn test_large_answer_is_streamed_whole() {
    let answer = "token ".repeat(5000);
    let worker = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(answer.clone()))
        .mount(&worker)
        .await;
    let registry = start_registry(&worker.uri()).await;

    let app = create_app(test_config(&registry.uri()), Arc::new(PassThrough)).await;
    let (status, body) = send_request(
        &app,
        Method::POST,
        "/v1/chat",
        Some(r#"{"question": "Hello", "model_name": "m1"}"#),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, answer.as_bytes());
}

#[tokio::test]
async fn test_unknown_model_is_bad_request() {
    let worker = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&worker)
        .await;
    let registry = start_registry(&worker.uri()).await;
    let moderation = Arc::new(RecordingModeration::default());

    let app = create_app(test_config(&registry.uri()), moderation.clone()).await;
    let (status, body) = send_request(
        &app,
        Method::POST,
        "/v1/chat",
        Some(r#"{"question": "Hello", "model_name": "m9"}"#),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_type(&body), "bad_request_param");
    assert_eq!(moderation.calls(), 0);
}

#[tokio::test]
async fn test_moderation_rejection_is_bad_request() {
    let worker = MockServer::start().await;
    let registry = start_registry(&worker.uri()).await;
    let moderation = Arc::new(RecordingModeration::default());
    moderation.reject_all(true);

    let app = create_app(test_config(&registry.uri()), moderation).await;
    let (status, body) = send_request(
        &app,
        Method::POST,
        "/v1/chat",
        Some(r#"{"question": "Hello", "model_name": "m1"}"#),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_type(&body), "sensitive_content");
}

#[tokio::test]
async fn test_worker_failure_does_not_leak_detail() {
    let worker = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory at 0x7f"))
        .mount(&worker)
        .await;
    let registry = start_registry(&worker.uri()).await;

    let app = create_app(test_config(&registry.uri()), Arc::new(PassThrough)).await;
    let (status, body) = send_request(
        &app,
        Method::POST,
        "/v1/chat",
        Some(r#"{"question": "Hello", "model_name": "m1"}"#),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(error_type(&body), "dispatch_failed");
    assert!(!String::from_utf8_lossy(&body).contains("CUDA"));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let worker = MockServer::start().await;
    let registry = start_registry(&worker.uri()).await;

    let app = create_app(test_config(&registry.uri()), Arc::new(PassThrough)).await;
    let (status, body) = send_request(&app, Method::POST, "/v1/chat", Some("{not json"), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_type(&body), "bad_request_body");
}

#[tokio::test]
async fn test_access_token_is_enforced() {
    let worker = MockServer::start().await;
    let registry = start_registry(&worker.uri()).await;
    let mut config = test_config(&registry.uri());
    config.auth.access_token = Some("secret".to_string());

    let app = create_app(config, Arc::new(PassThrough)).await;

    let (status, body) = send_request(&app, Method::GET, "/v1/chat/models", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_type(&body), "access_token_missing");

    let (status, body) =
        send_request(&app, Method::GET, "/v1/chat/models", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_type(&body), "access_token_invalid");

    let (status, _) =
        send_request(&app, Method::GET, "/v1/chat/models", None, Some("secret")).await;
    assert_eq!(status, StatusCode::OK);

    // Health stays open.
    let (status, _) = send_request(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_models_listing() {
    let worker = MockServer::start().await;
    let registry = start_registry(&worker.uri()).await;

    let app = create_app(test_config(&registry.uri()), Arc::new(PassThrough)).await;

    for m in [Method::GET, Method::POST] {
        let (status, body) = send_request(&app, m, "/v1/chat/models", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"data": ["m1"]}));
    }
}

#[tokio::test]
async fn test_health_and_metrics() {
    let worker = MockServer::start().await;
    let registry = start_registry(&worker.uri()).await;

    let app = create_app(test_config(&registry.uri()), Arc::new(PassThrough)).await;

    let (status, body) = send_request(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["directory"]["model_count"], 1);
    assert_eq!(value["directory"]["consecutive_failures"], 0);

    let (status, body) = send_request(&app, Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("gateway_admission_capacity 100"));
    assert!(text.contains("gateway_admission_in_flight 0"));
    assert!(text.contains("gateway_directory_models 1"));
}

#[tokio::test]
async fn test_worker_path_is_appended() {
    let worker = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/worker_generate_stream"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&worker)
        .await;
    let registry = start_registry(&worker.uri()).await;
    let mut config = test_config(&registry.uri());
    config.chat.worker_path = "/worker_generate_stream".to_string();

    let app = create_app(config, Arc::new(PassThrough)).await;
    let (status, body) = send_request(
        &app,
        Method::POST,
        "/v1/chat",
        Some(r#"{"question": "Hello", "model_name": "m1"}"#),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn test_nonexistent_route_returns_404() {
    let worker = MockServer::start().await;
    let registry = start_registry(&worker.uri()).await;

    let app = create_app(test_config(&registry.uri()), Arc::new(PassThrough)).await;
    let (status, body) = send_request(&app, Method::GET, "/nonexistent", None, None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_type(&body), "page_not_found");
}

#[tokio::test]
async fn test_wrong_method_returns_405_envelope() {
    let worker = MockServer::start().await;
    let registry = start_registry(&worker.uri()).await;

    let app = create_app(test_config(&registry.uri()), Arc::new(PassThrough)).await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/v1/chat")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let allow = response.headers().get("allow").unwrap().to_str().unwrap();
    assert!(allow.contains("POST"), "{allow}");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(error_type(&body), "method_not_allowed");
}

#[tokio::test]
async fn test_missing_question_is_bad_request_body() {
    let worker = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&worker)
        .await;
    let registry = start_registry(&worker.uri()).await;

    let app = create_app(test_config(&registry.uri()), Arc::new(PassThrough)).await;
    for body in [r#"{"model_name": "m1"}"#, r#"{"question": "Hello"}"#] {
        let (status, response) =
            send_request(&app, Method::POST, "/v1/chat", Some(body), None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(error_type(&response), "bad_request_body", "{body}");
    }
}

#[tokio::test]
async fn test_worker_failure_mid_stream_aborts_body() {
    // The worker promises 1000 bytes, sends three, then hangs up.
    let worker = spawn_truncating_server(200, 1000, b"abc").await;
    let registry = start_registry(&worker).await;

    let app = create_app(test_config(&registry.uri()), Arc::new(PassThrough)).await;
    for _ in 0..10 {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"question": "Hello", "model_name": "m1"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await;
        assert!(body.is_err(), "truncated answer delivered as complete: {body:?}");
    }
}
