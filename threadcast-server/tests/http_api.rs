//! HTTP API tests
//!
//! Drive the router in-process with a mock platform behind the session:
//! - Basic auth on `/send-tweet`
//! - JSON and URL-encoded bodies
//! - Success, validation and chain failure envelopes

use axum::body::{to_bytes, Body};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use libthreadcast::config::{AuthConfig, ClassificationMode, RetryConfig};
use libthreadcast::error::PlatformError;
use libthreadcast::platforms::mock::{MockHandle, MockPlatform};
use libthreadcast::types::PostId;
use secrecy::SecretString;
use serde_json::{json, Value};
use threadcast_server::{prepare_state, router};
use tower::ServiceExt;

fn retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        classification: ClassificationMode::Structured,
    }
}

async fn app_with(platform: MockPlatform) -> (Router, MockHandle) {
    let handle = platform.handle();
    let auth = AuthConfig {
        client_id: "ci".to_string(),
        client_secret: SecretString::from("cs"),
    };
    let state = prepare_state(Box::new(platform), &retry(), auth)
        .await
        .expect("startup login");
    (router(state), handle)
}

fn basic(id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", id, secret)))
}

fn json_request(body: Value, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/send-tweet")
        .header(CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn form_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/send-tweet")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(AUTHORIZATION, basic("ci", "cs"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_open() {
    let (app, _) = app_with(MockPlatform::success("x")).await;

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_missing_credentials_are_rejected() {
    let (app, handle) = app_with(MockPlatform::success("x")).await;

    let response = app
        .oneshot(json_request(json!({ "messages": ["hi"] }), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(WWW_AUTHENTICATE).unwrap(),
        "Basic realm=\"Secure Area\""
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Unauthorized");
    assert_eq!(handle.post_call_count(), 0);
}

#[tokio::test]
async fn test_wrong_credentials_are_rejected() {
    let (app, handle) = app_with(MockPlatform::success("x")).await;

    let response = app
        .clone()
        .oneshot(json_request(
            json!({ "messages": ["hi"] }),
            Some(&basic("ci", "nope")),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(json_request(
            json!({ "messages": ["hi"] }),
            Some("Bearer something"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(handle.post_call_count(), 0);
}

#[tokio::test]
async fn test_thread_is_posted_as_reply_chain() {
    let (app, handle) = app_with(MockPlatform::success("x")).await;

    let response = app
        .oneshot(json_request(
            json!({ "messages": ["1/3", "2/3", "3/3"] }),
            Some(&basic("ci", "cs")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "message": "Tweets sent successfully", "statusCode": 200 })
    );
    assert_eq!(
        handle.reply_targets(),
        vec![None, Some(PostId::new("x-1")), Some(PostId::new("x-2"))]
    );
}

#[tokio::test]
async fn test_empty_batch_succeeds_without_posting() {
    let (app, handle) = app_with(MockPlatform::success("x")).await;

    let response = app
        .oneshot(json_request(json!({ "messages": [] }), Some(&basic("ci", "cs"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(handle.post_call_count(), 0);
}

#[tokio::test]
async fn test_failure_after_success_keeps_first_post() {
    let network = || -> Result<(), PlatformError> {
        Err(PlatformError::Network("connection reset".to_string()))
    };
    let platform = MockPlatform::scripted("x", vec![Ok(()), network(), network(), network()]);
    let (app, handle) = app_with(platform).await;

    let response = app
        .oneshot(json_request(
            json!({ "messages": ["first", "second", "third"] }),
            Some(&basic("ci", "cs")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({
            "message": "Failed to send tweet after 3 attempts. Last error: connection reset",
            "statusCode": 500
        })
    );
    assert_eq!(handle.published(), vec![("first".to_string(), PostId::new("x-1"))]);
    // One attempt for the first message, three for the second, none for the third
    assert_eq!(handle.post_call_count(), 4);
}

#[tokio::test]
async fn test_expired_session_recovers_within_request() {
    let (app, handle) = app_with(MockPlatform::success("x")).await;
    handle.expire_session();

    let response = app
        .oneshot(json_request(json!({ "messages": ["hello"] }), Some(&basic("ci", "cs"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    // Startup login plus the recovery login
    assert_eq!(handle.auth_call_count(), 2);
    assert_eq!(handle.published().len(), 1);
}

#[tokio::test]
async fn test_url_encoded_indexed_messages() {
    let (app, handle) = app_with(MockPlatform::success("x")).await;

    let response = app
        .oneshot(form_request(
            "messages%5B1%5D=second&messages%5B0%5D=first+post",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let contents: Vec<String> = handle.published().into_iter().map(|(c, _)| c).collect();
    assert_eq!(contents, vec!["first post", "second"]);
}

#[tokio::test]
async fn test_url_encoded_repeated_messages() {
    let (app, handle) = app_with(MockPlatform::success("x")).await;

    let response = app
        .oneshot(form_request("messages=a&messages=b"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        handle.reply_targets(),
        vec![None, Some(PostId::new("x-1"))]
    );
}

#[tokio::test]
async fn test_missing_messages_is_bad_request() {
    let (app, handle) = app_with(MockPlatform::success("x")).await;

    let response = app
        .clone()
        .oneshot(json_request(json!({ "text": "hi" }), Some(&basic("ci", "cs"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["statusCode"], 400);

    let response = app.oneshot(form_request("text=hi")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(handle.post_call_count(), 0);
}

#[tokio::test]
async fn test_over_limit_message_fails_before_posting() {
    let (app, handle) = app_with(MockPlatform::with_limit("x", 10)).await;

    let response = app
        .oneshot(json_request(
            json!({ "messages": ["short", "this one is far too long"] }),
            Some(&basic("ci", "cs")),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["statusCode"], 500);
    assert!(body["message"].as_str().unwrap().contains("message 2"));
    assert_eq!(handle.post_call_count(), 0);
}

#[tokio::test]
async fn test_long_message_is_posted_without_configured_limit() {
    let (app, handle) = app_with(MockPlatform::success("x")).await;
    let long = "a".repeat(400);

    let response = app
        .oneshot(json_request(json!({ "messages": [long] }), Some(&basic("ci", "cs"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(handle.post_call_count(), 1);
}

#[tokio::test]
async fn test_blank_message_is_internal_error() {
    let (app, handle) = app_with(MockPlatform::success("x")).await;

    let response = app
        .oneshot(json_request(json!({ "messages": ["ok", "  "] }), Some(&basic("ci", "cs"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({
            "message": "Invalid input: message 2: Platform error: Content validation failed: Content cannot be empty",
            "statusCode": 500
        })
    );
    assert_eq!(handle.post_call_count(), 0);
}
