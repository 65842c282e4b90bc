//! Session registry.
//!
//! This module maps session keys to live upstream conversations. Sessions are
//! created on first use, replaced wholesale on reset, and live for as long as
//! the owning [`SessionStore`] does. Nothing is persisted.
//!
//! # Architecture
//!
//! - [`Session`]: one conversation, backed by a [`ChatHandle`](crate::llm::ChatHandle)
//! - [`SessionStore`]: thread-safe registry owned by the server state
//!
//! # Example
//!
//! ```rust,ignore
//! use gemini_chat::session::{SessionStore, DEFAULT_SESSION_KEY};
//!
//! let store = SessionStore::new(client);
//! let session = store.get_or_create(DEFAULT_SESSION_KEY)?;
//! let reply = session.send_message("Hello!").await?;
//!
//! // Start over with empty history.
//! store.reset(DEFAULT_SESSION_KEY)?;
//! ```

mod store;

pub use store::{DEFAULT_SESSION_KEY, Session, SessionStore};
