//! Upstream generative-language client.
//!
//! This module defines the seam between the HTTP layer and the hosted model.
//! The server only ever sees two operations: starting a conversation and
//! sending a message into it. Everything else (history, wire format,
//! authentication) lives behind the traits.
//!
//! # Overview
//!
//! - [`LlmClient`]: factory for conversations (one per session).
//! - [`ChatHandle`]: a live conversation that remembers its own turns.
//! - [`GeminiClient`]: Google Gemini `generateContent` implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! use gemini_chat::llm::{GeminiClient, LlmClient, LlmSettings};
//!
//! let client = GeminiClient::new(settings)?;
//! let chat = client.start_chat()?;
//! let reply = chat.send_message("Hello!").await?;
//! ```

pub mod gemini;

pub use gemini::{GeminiChat, GeminiClient, GeminiError};

use std::time::Duration;

/// Default model used when `GEMINI_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default API endpoint used when `GEMINI_BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default upstream HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Upstream connection and model settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the API (e.g., `https://generativelanguage.googleapis.com`).
    pub base_url: String,
    /// API key sent with every request. Always required.
    pub api_key: String,
    /// Model identifier (e.g., `gemini-2.0-flash`).
    pub model: String,
    /// Optional system instruction applied to every conversation.
    pub system_prompt: Option<String>,
    /// Sampling temperature (provider default when unset).
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens per reply.
    pub max_output_tokens: Option<u32>,
    /// Timeout for a single upstream request.
    pub timeout: Duration,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmSettings {
    /// Settings for `model` at the default endpoint with no generation overrides.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            system_prompt: None,
            temperature: None,
            max_output_tokens: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Role of a conversation turn, as the upstream API names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Turn written by the user.
    User,
    /// Turn produced by the model.
    Model,
}

/// Factory for upstream conversations.
///
/// Starting a chat is local: no request is made until the first message is
/// sent, so it is safe to call while holding a lock.
pub trait LlmClient: Send + Sync {
    /// Start a fresh conversation with empty history.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot produce a conversation.
    fn start_chat(&self) -> anyhow::Result<Box<dyn ChatHandle>>;
}

/// A live conversation with the upstream model.
///
/// Implementations accumulate history internally; callers only ever pass the
/// newest user message.
#[async_trait::async_trait]
pub trait ChatHandle: Send + Sync {
    /// Send a user message and return the model's textual reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the reply is blocked, or the
    /// response carries no text.
    async fn send_message(&self, text: &str) -> anyhow::Result<String>;

    /// Number of completed turns (user and model) in this conversation.
    async fn history_len(&self) -> usize;
}
