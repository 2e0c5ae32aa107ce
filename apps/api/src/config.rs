use std::fmt;

use anyhow::{Context, Result};

use crate::llm_client::{DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Application configuration loaded from environment variables.
/// Nothing is required: a missing API key only fails the model calls.
#[derive(Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub llm_timeout_secs: u64,
    pub workspace_idle_ttl_mins: i64,
    pub port: u16,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            gemini_model: DEFAULT_MODEL.to_string(),
            gemini_base_url: DEFAULT_BASE_URL.to_string(),
            llm_timeout_secs: 120,
            workspace_idle_ttl_mins: 120,
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}

// The key never reaches the logs.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("gemini_model", &self.gemini_model)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("workspace_idle_ttl_mins", &self.workspace_idle_ttl_mins)
            .field("port", &self.port)
            .field("rust_log", &self.rust_log)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so parsing is testable without
    /// touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Config {
            api_key: non_blank("API_KEY").or_else(|| non_blank("GEMINI_API_KEY")),
            gemini_model: non_blank("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_base_url: non_blank("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            llm_timeout_secs: parse_or(
                "LLM_TIMEOUT_SECS",
                non_blank("LLM_TIMEOUT_SECS"),
                defaults.llm_timeout_secs,
            )?,
            workspace_idle_ttl_mins: parse_or(
                "WORKSPACE_IDLE_TTL_MINS",
                non_blank("WORKSPACE_IDLE_TTL_MINS"),
                defaults.workspace_idle_ttl_mins,
            )?,
            port: parse_or("PORT", non_blank("PORT"), defaults.port)?,
            rust_log: non_blank("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {value}")),
        None => Ok(default),
    }
}
