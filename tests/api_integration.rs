//! HTTP surface tests against a scripted upstream client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use gemini_chat::AppState;
use gemini_chat::config::ServerConfig;
use gemini_chat::llm::{ChatHandle, LlmClient};
use gemini_chat::server::build_router;
use serde_json::Value;
use tower::ServiceExt;

const GENERIC_CHAT_ERROR: &str =
    "Sorry, I encountered an error processing your message. Please try again.";

/// Records every message as `(chat index, text)`.
type SendLog = Arc<Mutex<Vec<(usize, String)>>>;

#[derive(Default)]
struct ScriptedClient {
    started: AtomicUsize,
    log: SendLog,
    fail_start: bool,
    fail_send: Option<String>,
    delay: Option<Duration>,
}

struct ScriptedChat {
    index: usize,
    log: SendLog,
    fail_send: Option<String>,
    delay: Option<Duration>,
}

impl LlmClient for ScriptedClient {
    fn start_chat(&self) -> anyhow::Result<Box<dyn ChatHandle>> {
        if self.fail_start {
            anyhow::bail!("could not configure model");
        }
        let index = self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedChat {
            index,
            log: Arc::clone(&self.log),
            fail_send: self.fail_send.clone(),
            delay: self.delay,
        }))
    }
}

#[async_trait::async_trait]
impl ChatHandle for ScriptedChat {
    async fn send_message(&self, text: &str) -> anyhow::Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(detail) = &self.fail_send {
            anyhow::bail!("{detail}");
        }
        let mut log = self.log.lock().unwrap();
        log.push((self.index, text.to_string()));
        let turn = log.iter().filter(|(i, _)| *i == self.index).count();
        Ok(format!("reply {turn} from chat {}", self.index))
    }

    async fn history_len(&self) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(i, _)| *i == self.index)
            .count()
            * 2
    }
}

fn app_with(client: ScriptedClient) -> (Router, Arc<ScriptedClient>) {
    let client = Arc::new(client);
    let state = AppState::new(Arc::clone(&client) as Arc<dyn LlmClient>);
    (build_router(state, &ServerConfig::default()), client)
}

fn app() -> (Router, Arc<ScriptedClient>) {
    app_with(ScriptedClient::default())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn post_chat(app: &Router, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn post_clear(app: &Router) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/clear")
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

#[tokio::test]
async fn test_chat_returns_reply() {
    let (app, _) = app();

    let (status, json) = post_chat(&app, r#"{"message": "hello"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(json["response"], "reply 1 from chat 0");
}

#[tokio::test]
async fn test_chat_trims_message() {
    let (app, client) = app();

    let (status, _) = post_chat(&app, r#"{"message": "  hi there \n"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        client.log.lock().unwrap().as_slice(),
        &[(0, "hi there".to_string())]
    );
}

#[tokio::test]
async fn test_empty_message_is_rejected_without_upstream_call() {
    let (app, client) = app();

    for body in [r#"{"message": ""}"#, r#"{"message": "   "}"#, "{}"] {
        let (status, json) = post_chat(&app, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json["error"], "Empty message");
    }

    assert_eq!(client.started.load(Ordering::SeqCst), 0);
    assert!(client.log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let (app, client) = app();

    for body in ["not json", r#"{"message": 42}"#, r#"{"message": null}"#] {
        let (status, json) = post_chat(&app, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(json["error"], "Invalid request body");
    }

    assert_eq!(client.started.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_content_type_is_rejected() {
    let (app, _) = app();

    let request = Request::builder()
        .method("POST")
        .uri("/chat")
        .body(Body::from(r#"{"message": "hello"}"#))
        .unwrap();
    let (status, json) = send(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Invalid request body");
}

#[tokio::test]
async fn test_messages_share_one_conversation() {
    let (app, client) = app();

    let (_, first) = post_chat(&app, r#"{"message": "hi"}"#).await;
    let (_, second) = post_chat(&app, r#"{"message": "hi"}"#).await;

    assert_eq!(first["response"], "reply 1 from chat 0");
    assert_eq!(second["response"], "reply 2 from chat 0");
    assert_eq!(client.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clear_replaces_conversation() {
    let (app, client) = app();

    post_chat(&app, r#"{"message": "before"}"#).await;

    let (status, json) = post_clear(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!({"status": "success"}));

    let (_, reply) = post_chat(&app, r#"{"message": "after"}"#).await;
    assert_eq!(reply["response"], "reply 1 from chat 1");

    let log = client.log.lock().unwrap();
    assert_eq!(
        log.as_slice(),
        &[(0, "before".to_string()), (1, "after".to_string())]
    );
}

#[tokio::test]
async fn test_clear_before_any_chat() {
    let (app, client) = app();

    let (status, _) = post_clear(&app).await;
    assert_eq!(status, StatusCode::OK);

    let (_, reply) = post_chat(&app, r#"{"message": "first"}"#).await;
    assert_eq!(reply["response"], "reply 1 from chat 0");
    assert_eq!(client.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upstream_failure_is_generic() {
    let (app, _) = app_with(ScriptedClient {
        fail_send: Some("quota exceeded for key AIza-secret".to_string()),
        ..ScriptedClient::default()
    });

    let (status, json) = post_chat(&app, r#"{"message": "hello"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], GENERIC_CHAT_ERROR);
    assert!(!json.to_string().contains("AIza-secret"));
    assert!(json.get("response").is_none());
}

#[tokio::test]
async fn test_session_start_failure_is_generic() {
    let (app, _) = app_with(ScriptedClient {
        fail_start: true,
        ..ScriptedClient::default()
    });

    let (status, json) = post_chat(&app, r#"{"message": "hello"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], GENERIC_CHAT_ERROR);
}

#[tokio::test]
async fn test_clear_failure() {
    let (app, _) = app_with(ScriptedClient {
        fail_start: true,
        ..ScriptedClient::default()
    });

    let (status, json) = post_clear(&app).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Failed to clear chat");
}

#[tokio::test]
async fn test_index_always_served() {
    let (app, _) = app_with(ScriptedClient {
        fail_start: true,
        fail_send: Some("down".to_string()),
        ..ScriptedClient::default()
    });

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/html"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&body).contains("<!DOCTYPE html>"));
}

#[tokio::test]
async fn test_wrong_method_is_rejected() {
    let (app, _) = app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/chat").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test(start_paused = true)]
async fn test_slow_upstream_times_out() {
    let client = Arc::new(ScriptedClient {
        delay: Some(Duration::from_secs(30)),
        ..ScriptedClient::default()
    });
    let config = ServerConfig {
        request_timeout_secs: 1,
        ..ServerConfig::default()
    };
    let app = build_router(
        AppState::new(Arc::clone(&client) as Arc<dyn LlmClient>),
        &config,
    );

    let (status, json) = post_chat(&app, r#"{"message": "hello"}"#).await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(json["error"], "Request timed out");
}

#[tokio::test(start_paused = true)]
async fn test_clear_during_inflight_chat() {
    let (app, client) = app_with(ScriptedClient {
        delay: Some(Duration::from_millis(200)),
        ..ScriptedClient::default()
    });

    let inflight = {
        let app = app.clone();
        tokio::spawn(async move { post_chat(&app, r#"{"message": "slow"}"#).await })
    };
    // Wait until the slow request holds chat 0.
    while client.started.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    let (status, _) = post_clear(&app).await;
    assert_eq!(status, StatusCode::OK);

    let (status, reply) = inflight.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["response"], "reply 1 from chat 0");

    let (_, reply) = post_chat(&app, r#"{"message": "next"}"#).await;
    assert_eq!(reply["response"], "reply 1 from chat 1");

    let log = client.log.lock().unwrap();
    assert_eq!(
        log.as_slice(),
        &[(0, "slow".to_string()), (1, "next".to_string())]
    );
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let client = Arc::new(ScriptedClient::default());
    let config = ServerConfig {
        body_limit_bytes: 16,
        ..ServerConfig::default()
    };
    let app = build_router(
        AppState::new(Arc::clone(&client) as Arc<dyn LlmClient>),
        &config,
    );

    let body = serde_json::json!({ "message": "x".repeat(100) }).to_string();
    let (status, json) = post_chat(&app, &body).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["error"], "Request body too large");
    assert_eq!(client.started.load(Ordering::SeqCst), 0);
}
