use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT, LlmSettings};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `CHAT_SERVER__PORT=8000`.
const ENV_PREFIX: &str = "CHAT";

/// Config file picked up from the working directory when none is given.
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Verbose logging. No plain env fallback: `DEBUG` is often set for other
    /// tools; use `CHAT_SERVER__DEBUG` instead.
    #[arg(long)]
    pub debug: bool,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", value_parser = clap::builder::BoolishValueParser::new())]
    pub log_json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub debug: bool,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".to_string(),
            debug: false,
            request_timeout_secs: 120,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let defaults = ServerConfig::default();
        let mut builder = Config::builder()
            .set_default("server.port", i64::from(defaults.port))?
            .set_default("server.host", defaults.host)?
            .set_default("server.debug", defaults.debug)?
            .set_default("server.request_timeout_secs", defaults.request_timeout_secs)?
            .set_default("server.body_limit_bytes", defaults.body_limit_bytes as u64)?
            .set_default("logging.json", false)?;

        // Explicit file must exist; the cwd fallback is optional.
        if let Some(path) = &cli.config {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // CLI flags (and their plain env vars) win over everything else.
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if cli.debug {
            builder = builder.set_override("server.debug", true)?;
        }
        if cli.log_json {
            builder = builder.set_override("logging.json", true)?;
        }

        let cfg = builder.build()?;
        cfg.try_deserialize()
    }
}

/// Load upstream settings from the process environment.
pub fn load_llm_settings() -> Result<LlmSettings, String> {
    llm_settings_from(|key| std::env::var(key).ok())
}

/// Build upstream settings from a variable lookup.
///
/// `GEMINI_API_KEY` is required; there is no built-in fallback.
pub fn llm_settings_from<F>(lookup: F) -> Result<LlmSettings, String>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

    let api_key = non_empty("GEMINI_API_KEY").ok_or_else(|| {
        "Missing required env var: GEMINI_API_KEY (set it in the environment or a .env file)"
            .to_string()
    })?;

    let model = non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let base_url = non_empty("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    url::Url::parse(&base_url)
        .map_err(|e| format!("GEMINI_BASE_URL is not a valid URL ({base_url}): {e}"))?;

    let temperature = non_empty("GEMINI_TEMPERATURE")
        .map(|s| {
            s.trim()
                .parse::<f32>()
                .map_err(|_| format!("GEMINI_TEMPERATURE must be a number, got {s:?}"))
        })
        .transpose()?;

    let max_output_tokens = non_empty("GEMINI_MAX_OUTPUT_TOKENS")
        .map(|s| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| format!("GEMINI_MAX_OUTPUT_TOKENS must be a positive integer, got {s:?}"))
        })
        .transpose()?;

    let timeout = non_empty("GEMINI_TIMEOUT_SECS")
        .map(|s| {
            s.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| format!("GEMINI_TIMEOUT_SECS must be a whole number of seconds, got {s:?}"))
        })
        .transpose()?
        .unwrap_or(DEFAULT_TIMEOUT);

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        system_prompt: non_empty("GEMINI_SYSTEM_PROMPT"),
        temperature,
        max_output_tokens,
        timeout,
    })
}
