//! Gemini Chat
//!
//! A small web server that relays chat messages from a browser page to the
//! Google Gemini API and returns the replies as JSON.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with three routes (`/`, `/chat`, `/clear`)
//! - **Sessions**: In-memory registry of upstream conversations
//! - **LLM**: Trait seam plus the Gemini `generateContent` client
//!
//! # Modules
//!
//! - [`config`]: CLI, file, and environment configuration
//! - [`error`]: HTTP error type
//! - [`llm`]: Upstream client traits and implementation
//! - [`server`]: Router, handlers, and server startup
//! - [`session`]: Session registry

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod config;
pub mod error;
pub mod llm;
pub mod server;
pub mod session;

use std::sync::Arc;

use llm::LlmClient;
use session::SessionStore;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Session registry for conversation management.
    pub sessions: SessionStore,
}

impl AppState {
    /// Build state whose sessions start conversations with `client`.
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            sessions: SessionStore::new(client),
        }
    }
}
