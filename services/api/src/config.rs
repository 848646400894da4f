//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// How the quiz answer handler writes a new board position back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressUpdateMode {
    /// Plain read-modify-write. Concurrent answers for the same pair can lose updates.
    Unguarded,
    /// Conditional update on the previously read position, re-read and retried on conflict.
    CompareAndSwap { max_retries: u32 },
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Store-backed endpoints answer with a configuration error when this is absent.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub log_level: Level,
    /// Model-backed endpoints answer with a configuration error when this is absent.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub answer_model: String,
    pub quiz_model: String,
    pub upstream_timeout: Duration,
    pub stream_idle_timeout: Duration,
    pub progress_update_mode: ProgressUpdateMode,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = non_empty_var("DATABASE_URL");
        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 5u32)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Model Settings ---
        let openai_api_key = non_empty_var("OPENAI_API_KEY");
        let openai_base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        let answer_model =
            std::env::var("ANSWER_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let quiz_model = std::env::var("QUIZ_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let upstream_timeout = Duration::from_secs(parse_var("UPSTREAM_TIMEOUT_SECS", 30u64)?);
        let stream_idle_timeout =
            Duration::from_secs(parse_var("STREAM_IDLE_TIMEOUT_SECS", 30u64)?);

        // --- Load Progress Settings ---
        let max_retries = parse_var("PROGRESS_CAS_MAX_RETRIES", 5u32)?;
        let progress_update_mode = parse_update_mode(
            &std::env::var("PROGRESS_UPDATE_MODE").unwrap_or_else(|_| "compare_and_swap".to_string()),
            max_retries,
        )?;

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            openai_api_key,
            openai_base_url,
            answer_model,
            quiz_model,
            upstream_timeout,
            stream_idle_timeout,
            progress_update_mode,
        })
    }
}

impl Default for Config {
    /// Local defaults with no store and no model credentials configured.
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            database_max_connections: 5,
            log_level: Level::INFO,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            answer_model: "gpt-4o".to_string(),
            quiz_model: "gpt-4o".to_string(),
            upstream_timeout: Duration::from_secs(30),
            stream_idle_timeout: Duration::from_secs(30),
            progress_update_mode: ProgressUpdateMode::CompareAndSwap { max_retries: 5 },
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_update_mode(raw: &str, max_retries: u32) -> Result<ProgressUpdateMode, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "unguarded" => Ok(ProgressUpdateMode::Unguarded),
        "compare_and_swap" | "cas" => Ok(ProgressUpdateMode::CompareAndSwap { max_retries }),
        other => Err(ConfigError::InvalidValue(
            "PROGRESS_UPDATE_MODE".to_string(),
            format!("'{}' is not one of unguarded, compare_and_swap", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_mode_parses_known_names() {
        assert_eq!(
            parse_update_mode("unguarded", 3).unwrap(),
            ProgressUpdateMode::Unguarded
        );
        assert_eq!(
            parse_update_mode(" Compare_And_Swap ", 3).unwrap(),
            ProgressUpdateMode::CompareAndSwap { max_retries: 3 }
        );
        assert!(parse_update_mode("locking", 3).is_err());
    }

    #[test]
    fn default_config_has_no_credentials() {
        let config = Config::default();
        assert!(config.database_url.is_none());
        assert!(config.openai_api_key.is_none());
    }
}
