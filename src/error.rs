//! HTTP-facing error type.
//!
//! Every variant renders as `{"error": "<message>"}`. Upstream failures carry
//! their cause for logging, but only the generic message reaches the client.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors returned by the chat API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The message was missing or blank after trimming.
    #[error("Empty message")]
    EmptyMessage,

    /// The body was not a JSON object of the expected shape.
    #[error("Invalid request body")]
    InvalidBody(#[source] JsonRejection),

    /// The body exceeded `server.body_limit_bytes`.
    #[error("Request body too large")]
    PayloadTooLarge(#[source] JsonRejection),

    /// Sending the message upstream failed.
    #[error("Sorry, I encountered an error processing your message. Please try again.")]
    Chat(#[source] anyhow::Error),

    /// Replacing the session's conversation failed.
    #[error("Failed to clear chat")]
    Clear(#[source] anyhow::Error),

    /// The request exceeded the server-side timeout.
    #[error("Request timed out")]
    Timeout,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::EmptyMessage | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Chat(_) | Self::Clear(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        // The body limit surfaces as a buffering failure carrying 413.
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(rejection)
        } else {
            Self::InvalidBody(rejection)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
