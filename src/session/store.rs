//! Conversation sessions and the registry that owns them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::llm::{ChatHandle, LlmClient};

/// Key used by the HTTP layer for its single conversation.
pub const DEFAULT_SESSION_KEY: &str = "default";

/// A single conversation session.
///
/// Cloning is cheap and yields another reference to the same conversation.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    /// Registry key this session was created under.
    key: String,
    /// Unique id of this conversation; changes on every reset.
    conversation_id: String,
    /// Session creation time.
    created_at: DateTime<Utc>,
    /// Upstream conversation handle.
    chat: Box<dyn ChatHandle>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.inner.key)
            .field("conversation_id", &self.inner.conversation_id)
            .field("created_at", &self.inner.created_at)
            .finish()
    }
}

impl Session {
    fn new(key: &str, chat: Box<dyn ChatHandle>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                key: key.to_string(),
                conversation_id: Uuid::new_v4().to_string(),
                created_at: Utc::now(),
                chat,
            }),
        }
    }

    /// Registry key of this session.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Unique id of the underlying conversation.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.inner.conversation_id
    }

    /// When this conversation was started.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Forward a message to the upstream conversation.
    pub async fn send_message(&self, text: &str) -> anyhow::Result<String> {
        self.inner.chat.send_message(text).await
    }

    /// Number of completed turns in the conversation.
    pub async fn history_len(&self) -> usize {
        self.inner.chat.history_len().await
    }

    /// Whether two values refer to the same conversation.
    #[must_use]
    pub fn same_conversation(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Thread-safe registry mapping session keys to live conversations.
///
/// Sessions are created lazily and never evicted. Creation and reset both
/// happen under the write lock, so a key never has two live conversations.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

struct SessionStoreInner {
    client: Arc<dyn LlmClient>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .finish()
    }
}

impl SessionStore {
    /// Create an empty store that starts conversations with `client`.
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                client,
                sessions: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Get a session by key without creating it.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Session> {
        let guard = self
            .inner
            .sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.get(key).cloned()
    }

    /// Get the session for `key`, starting a conversation if there is none.
    pub fn get_or_create(&self, key: &str) -> anyhow::Result<Session> {
        if let Some(session) = self.get(key) {
            return Ok(session);
        }

        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Another request may have created it while we waited for the lock.
        if let Some(session) = guard.get(key) {
            return Ok(session.clone());
        }

        let session = Session::new(key, self.inner.client.start_chat()?);
        tracing::info!(
            name: "session.created",
            key = %key,
            conversation_id = %session.conversation_id(),
            "Session created"
        );
        guard.insert(key.to_string(), session.clone());
        Ok(session)
    }

    /// Replace the conversation for `key` with a fresh one.
    ///
    /// On failure the previous conversation, if any, stays in place.
    pub fn reset(&self, key: &str) -> anyhow::Result<Session> {
        let mut guard = self
            .inner
            .sessions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let session = Session::new(key, self.inner.client.start_chat()?);
        let previous = guard.insert(key.to_string(), session.clone());

        tracing::info!(
            name: "session.reset",
            key = %key,
            conversation_id = %session.conversation_id(),
            previous = ?previous.as_ref().map(Session::conversation_id),
            "Session reset"
        );
        Ok(session)
    }

    /// Number of sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
