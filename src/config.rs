//! Application configuration parsed from environment variables.
//!
//! Variables:
//! - `EXAM_SHELL_API_URL`: API base URL (default `http://localhost:4000/api/v1`)
//! - `EXAM_SHELL_CONNECT_TIMEOUT_SECS`: default 10
//! - `EXAM_SHELL_REQUEST_TIMEOUT_SECS`: unset means requests never time out
//! - `EXAM_SHELL_INITIAL_HASH`: starting navigation hash (default empty)

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:4000/api/v1";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const ENV_API_URL: &str = "EXAM_SHELL_API_URL";
pub const ENV_CONNECT_TIMEOUT: &str = "EXAM_SHELL_CONNECT_TIMEOUT_SECS";
pub const ENV_REQUEST_TIMEOUT: &str = "EXAM_SHELL_REQUEST_TIMEOUT_SECS";
pub const ENV_INITIAL_HASH: &str = "EXAM_SHELL_INITIAL_HASH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The API base is not an absolute http(s) URL.
    #[error("invalid API base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// A numeric variable could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// API base without a trailing slash.
    pub api_base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub initial_hash: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_owned(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: None,
            initial_hash: String::new(),
        }
    }
}

impl AppConfig {
    /// Build config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the base URL or a timeout is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the base URL or a timeout is malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_url = lookup(ENV_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_owned());
        let api_base_url = parse_base_url(&raw_url)?;

        let connect_secs = parse_secs(ENV_CONNECT_TIMEOUT, lookup(ENV_CONNECT_TIMEOUT))?
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        let request_timeout = parse_secs(ENV_REQUEST_TIMEOUT, lookup(ENV_REQUEST_TIMEOUT))?.map(Duration::from_secs);

        Ok(Self {
            api_base_url,
            connect_timeout: Duration::from_secs(connect_secs),
            request_timeout,
            initial_hash: lookup(ENV_INITIAL_HASH).unwrap_or_default(),
        })
    }

    /// Override the API base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] for non-http(s) URLs.
    pub fn with_api_base_url(mut self, url: &str) -> Result<Self, ConfigError> {
        self.api_base_url = parse_base_url(url)?;
        Ok(self)
    }
}

fn parse_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = |reason: String| ConfigError::InvalidBaseUrl { url: raw.to_owned(), reason };

    let url = reqwest::Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_owned()),
        other => Err(invalid(format!("unsupported scheme {other}"))),
    }
}

fn parse_secs(var: &'static str, raw: Option<String>) -> Result<Option<u64>, ConfigError> {
    let Some(value) = raw else {
        return Ok(None);
    };
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber { var, value })
}
