use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State, rejection::JsonRejection},
    middleware::Next,
    response::{Html, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::config::{AppConfig, ServerConfig};
use crate::error::ApiError;
use crate::llm::{GeminiClient, LlmClient, LlmSettings};
use crate::session::DEFAULT_SESSION_KEY;

/// Chat interface served at `/`.
const INDEX_HTML: &str = include_str!("../static/index.html");

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, settings: LlmSettings) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        timeout_secs = settings.timeout.as_secs(),
        "LLM configuration loaded"
    );

    let client: Arc<dyn LlmClient> = Arc::new(GeminiClient::new(settings)?);
    let state = AppState::new(client);
    let app = build_router(state, &config.server);

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        debug = config.server.debug,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Build the application router.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let timeout = config.request_timeout();

    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_handler))
        .route("/clear", post(clear_handler))
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => {
                        tracing::warn!(timeout_secs = timeout.as_secs(), "Request timed out");
                        ApiError::Timeout.into_response()
                    }
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for the chat endpoint.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// User message. Absent is treated like empty.
    #[serde(default)]
    message: String,
}

/// Successful chat reply.
#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    status: &'static str,
}

/// Bare acknowledgment.
#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

/// GET / - Chat interface.
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// POST /chat - Send a message to the default session.
async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| {
        tracing::warn!(error = %e, "Rejected chat request body");
        ApiError::from(e)
    })?;

    let message = req.message.trim();
    if message.is_empty() {
        return Err(ApiError::EmptyMessage);
    }

    tracing::info!(message_length = message.len(), "Received chat request");
    tracing::debug!(message = %message, "Chat message");

    let session = state
        .sessions
        .get_or_create(DEFAULT_SESSION_KEY)
        .map_err(|e| {
            tracing::error!(error = %format!("{e:#}"), "Failed to start chat session");
            ApiError::Chat(e)
        })?;

    match session.send_message(message).await {
        Ok(response) => {
            tracing::info!(
                conversation_id = %session.conversation_id(),
                response_length = response.len(),
                "Chat response received"
            );
            Ok(Json(ChatResponse {
                response,
                status: "success",
            }))
        }
        Err(e) => {
            tracing::error!(
                conversation_id = %session.conversation_id(),
                error = %format!("{e:#}"),
                "Error in chat endpoint"
            );
            Err(ApiError::Chat(e))
        }
    }
}

/// POST /clear - Replace the default session with a fresh conversation.
async fn clear_handler(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    state.sessions.reset(DEFAULT_SESSION_KEY).map_err(|e| {
        tracing::error!(error = %format!("{e:#}"), "Error clearing chat");
        ApiError::Clear(e)
    })?;

    Ok(Json(StatusResponse { status: "success" }))
}
