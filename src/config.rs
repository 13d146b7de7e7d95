//! Runtime configuration, read from the environment

use crate::llm::DEFAULT_BASE_URL;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Configuration for a dialogue session
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueConfig {
    /// Ollama base URL
    pub ollama_url: String,
    /// Model that writes the spoken replies
    pub reply_model: String,
    /// Model that produces contradiction verdicts
    pub contradiction_model: String,
    pub reply_temperature: f32,
    pub contradiction_temperature: f32,
    /// No-input window for a listen cycle
    pub no_input_timeout: Duration,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Attempts per backend call, including the first
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    /// Dedicated contradiction classifier; when unset the chat model is used
    pub predictor_url: Option<String>,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_BASE_URL.to_string(),
            reply_model: "llama3:latest".to_string(),
            contradiction_model: "contradiction-model:latest".to_string(),
            reply_temperature: 0.8,
            contradiction_temperature: 0.0,
            no_input_timeout: Duration::from_millis(5000),
            request_timeout: Duration::from_secs(120),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(1000),
            predictor_url: None,
        }
    }
}

impl DialogueConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let string = |name: &str, default: String| lookup(name).unwrap_or(default);

        Ok(Self {
            ollama_url: string("RECAP_OLLAMA_URL", defaults.ollama_url),
            reply_model: string("RECAP_REPLY_MODEL", defaults.reply_model),
            contradiction_model: string("RECAP_CONTRADICTION_MODEL", defaults.contradiction_model),
            reply_temperature: parse(&lookup, "RECAP_REPLY_TEMPERATURE")?
                .unwrap_or(defaults.reply_temperature),
            contradiction_temperature: parse(&lookup, "RECAP_CONTRADICTION_TEMPERATURE")?
                .unwrap_or(defaults.contradiction_temperature),
            no_input_timeout: parse(&lookup, "RECAP_NO_INPUT_TIMEOUT_MS")?
                .map_or(defaults.no_input_timeout, Duration::from_millis),
            request_timeout: parse(&lookup, "RECAP_REQUEST_TIMEOUT_SECS")?
                .map_or(defaults.request_timeout, Duration::from_secs),
            max_attempts: parse(&lookup, "RECAP_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            retry_base_delay: parse(&lookup, "RECAP_RETRY_BASE_MS")?
                .map_or(defaults.retry_base_delay, Duration::from_millis),
            predictor_url: lookup("RECAP_PREDICTOR_URL").filter(|url| !url.is_empty()),
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}
