//! Google Gemini `generateContent` client.
//!
//! Each [`GeminiChat`] keeps the conversation as a list of `contents` and
//! replays it on every call, which is how the API expects multi-turn chat to
//! be driven. History only grows when a call succeeds, so a failed message
//! can simply be retried by the user.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{ChatHandle, LlmClient, LlmSettings, MessageRole};

/// Errors returned by the Gemini client.
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    /// Transport failure, timeout, or undecodable body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Gemini API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the API's error envelope, or the raw body.
        message: String,
    },

    /// The prompt was rejected before generation.
    #[error("Prompt blocked: {0}")]
    Blocked(String),

    /// The response had no candidate text.
    #[error("Empty response (finish reason: {})", .finish_reason.as_deref().unwrap_or("unknown"))]
    EmptyResponse {
        /// Finish reason reported for the first candidate, if any.
        finish_reason: Option<String>,
    },
}

/// A single turn in the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// Author of the turn. Omitted for system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    /// Ordered parts of the turn.
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<MessageRole>, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }

    /// Concatenated text of all text parts.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

/// A content part. Only text parts are produced or consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Client for the Gemini API.
///
/// Cheap to clone; all conversations share one connection pool.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    settings: Arc<LlmSettings>,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("settings", &self.settings)
            .finish()
    }
}

impl GeminiClient {
    /// Create a client with the given settings.
    pub fn new(settings: LlmSettings) -> Result<Self, GeminiError> {
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            http,
            settings: Arc::new(settings),
        })
    }

    /// Start a conversation, returning the concrete type.
    #[must_use]
    pub fn chat(&self) -> GeminiChat {
        GeminiChat {
            http: self.http.clone(),
            settings: Arc::clone(&self.settings),
            history: Mutex::new(Vec::new()),
        }
    }
}

impl LlmClient for GeminiClient {
    fn start_chat(&self) -> anyhow::Result<Box<dyn ChatHandle>> {
        Ok(Box::new(self.chat()))
    }
}

/// A multi-turn Gemini conversation.
pub struct GeminiChat {
    http: reqwest::Client,
    settings: Arc<LlmSettings>,
    history: Mutex<Vec<Content>>,
}

impl std::fmt::Debug for GeminiChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiChat")
            .field("model", &self.settings.model)
            .finish()
    }
}

impl GeminiChat {
    /// Send `text` as the next user turn.
    ///
    /// The history lock is held for the whole round trip so concurrent sends
    /// on one conversation are applied in order.
    pub async fn send(&self, text: &str) -> Result<String, GeminiError> {
        let mut history = self.history.lock().await;

        let user_turn = Content::text(Some(MessageRole::User), text);
        let mut contents = history.clone();
        contents.push(user_turn.clone());

        let body = build_request(&self.settings, &contents);
        let url = build_generate_url(&self.settings.base_url, &self.settings.model);

        tracing::debug!(
            model = %self.settings.model,
            turns = contents.len(),
            "Sending generateContent request"
        );

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            return Err(GeminiError::Api {
                status: status.as_u16(),
                message: api_error_message(&raw),
            });
        }

        let parsed: GenerateContentResponse = resp.json().await?;
        let (reply, model_turn) = extract_reply(parsed)?;

        history.push(user_turn);
        history.push(model_turn);

        tracing::debug!(
            model = %self.settings.model,
            reply_length = reply.len(),
            history_len = history.len(),
            "generateContent completed"
        );

        Ok(reply)
    }
}

#[async_trait::async_trait]
impl ChatHandle for GeminiChat {
    async fn send_message(&self, text: &str) -> anyhow::Result<String> {
        Ok(self.send(text).await?)
    }

    async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }
}

/// Build the `generateContent` URL for a model.
///
/// Accepts model names with or without the `models/` prefix.
#[must_use]
pub fn build_generate_url(base_url: &str, model: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let model = model.trim_start_matches("models/");
    format!("{base}/v1beta/models/{model}:generateContent")
}

fn build_request<'a>(settings: &LlmSettings, contents: &'a [Content]) -> GenerateContentRequest<'a> {
    let generation_config = (settings.temperature.is_some()
        || settings.max_output_tokens.is_some())
    .then(|| GenerationConfig {
        temperature: settings.temperature,
        max_output_tokens: settings.max_output_tokens,
    });

    GenerateContentRequest {
        contents,
        system_instruction: settings
            .system_prompt
            .as_ref()
            .map(|p| Content::text(None, p.clone())),
        generation_config,
    }
}

/// Pull the reply text and the model turn to record out of a response.
fn extract_reply(resp: GenerateContentResponse) -> Result<(String, Content), GeminiError> {
    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GeminiError::Blocked(reason));
    }

    let Some(candidate) = resp.candidates.into_iter().next() else {
        return Err(GeminiError::EmptyResponse {
            finish_reason: None,
        });
    };

    let text = candidate
        .content
        .as_ref()
        .map(Content::joined_text)
        .unwrap_or_default();

    if text.is_empty() {
        return Err(GeminiError::EmptyResponse {
            finish_reason: candidate.finish_reason,
        });
    }

    Ok((text.clone(), Content::text(Some(MessageRole::Model), text)))
}

fn api_error_message(raw: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(raw) {
        Ok(envelope) => envelope.error.message,
        Err(_) => raw.chars().take(500).collect(),
    }
}
