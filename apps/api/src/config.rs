use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_SEARCH_API_URL: &str = "https://api.tavily.com/search";

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    /// Artifact persistence. When unset, finished artifacts are only logged.
    pub database_url: Option<String>,
    /// Shared rate-limit counters. When unset, an in-process limiter is used.
    pub redis_url: Option<String>,
    pub search_api_url: String,
    pub search_api_key: Option<String>,
    pub prediction_api_url: Option<String>,
    pub prediction_api_token: Option<String>,
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
    /// Wall-clock ceiling for a single streamed generation run.
    pub generation_budget: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            database_url: optional_env("DATABASE_URL"),
            redis_url: optional_env("REDIS_URL"),
            search_api_url: optional_env("SEARCH_API_URL")
                .unwrap_or_else(|| DEFAULT_SEARCH_API_URL.to_string()),
            search_api_key: optional_env("SEARCH_API_KEY"),
            prediction_api_url: optional_env("PREDICTION_API_URL"),
            prediction_api_token: optional_env("PREDICTION_API_TOKEN"),
            rate_limit_max_requests: parse_env("RATE_LIMIT_MAX_REQUESTS", 10)?,
            rate_limit_window_secs: parse_env("RATE_LIMIT_WINDOW_SECS", 60)?,
            generation_budget: Duration::from_secs(parse_env("GENERATION_BUDGET_SECS", 60)?),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
impl Config {
    /// Configuration for handler tests: no external integrations.
    pub fn for_tests() -> Self {
        Config {
            anthropic_api_key: "test-key".to_string(),
            database_url: None,
            redis_url: None,
            search_api_url: DEFAULT_SEARCH_API_URL.to_string(),
            search_api_key: None,
            prediction_api_url: None,
            prediction_api_token: None,
            rate_limit_max_requests: 10,
            rate_limit_window_secs: 60,
            generation_budget: Duration::from_secs(5),
            port: 0,
            rust_log: "debug".to_string(),
        }
    }
}
