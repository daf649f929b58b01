//! Engine configuration, read from the environment (and `.env` when present).

use crate::error::{DapError, Result};
use std::str::FromStr;
use std::time::Duration;

/// Key value that marks a deliberately unconfigured credential.
pub const PLACEHOLDER_API_KEY: &str = "test_key_placeholder";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub llm_timeout: Duration,
    pub daily_call_limit: u32,
    pub max_query_length: usize,
    pub enable_sql_optimization: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            llm_timeout: Duration::from_secs(10),
            daily_call_limit: 1000,
            max_query_length: 500,
            enable_sql_optimization: false,
        }
    }
}

impl EngineConfig {
    /// Loads `.env` (if any) and overlays environment variables on the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let timeout_secs: u64 = parse_or(&lookup, "LLM_TIMEOUT_SECS", defaults.llm_timeout.as_secs())?;

        Ok(Self {
            api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            model: lookup("OPENAI_MODEL").unwrap_or(defaults.model),
            base_url: lookup("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            temperature: parse_or(&lookup, "OPENAI_TEMPERATURE", defaults.temperature)?,
            max_tokens: parse_or(&lookup, "OPENAI_MAX_TOKENS", defaults.max_tokens)?,
            llm_timeout: Duration::from_secs(timeout_secs),
            daily_call_limit: parse_or(&lookup, "LLM_DAILY_CALL_LIMIT", defaults.daily_call_limit)?,
            max_query_length: parse_or(&lookup, "MAX_QUERY_LENGTH", defaults.max_query_length)?,
            enable_sql_optimization: parse_or(
                &lookup,
                "ENABLE_SQL_OPTIMIZATION",
                defaults.enable_sql_optimization,
            )?,
        })
    }

    pub fn has_credentials(&self) -> bool {
        matches!(&self.api_key, Some(key) if key != PLACEHOLDER_API_KEY)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| DapError::Config(format!("Invalid value for {}: '{}' ({})", key, raw, e))),
        None => Ok(default),
    }
}
