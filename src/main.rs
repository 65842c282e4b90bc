//! Gemini Chat Server
//!
//! Entry point: loads configuration, sets up logging, and serves the chat UI.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use dotenvy::dotenv;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use gemini_chat::config::{AppConfig, LoggingConfig, load_llm_settings};
use gemini_chat::server;

#[tokio::main]
async fn main() {
    // Load .env (if present)
    let _ = dotenv();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing (M-LOG-STRUCTURED)
    init_tracing(&config.logging, config.server.debug);

    // The API key has no fallback: refuse to start without it.
    let settings = match load_llm_settings() {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Configuration error: {msg}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::start_server(Arc::new(config), settings).await {
        tracing::error!(error = %format!("{e:#}"), "Server error");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` in debug mode.
fn init_tracing(logging: &LoggingConfig, debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
