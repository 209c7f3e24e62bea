//! HTTP fetch seam used by the event broker.
//!
//! DESIGN
//! ======
//! The broker depends on the [`Fetcher`] trait, not on `reqwest`, so tests can
//! control exactly when and how a response arrives. [`HttpFetcher`] is the
//! production implementation: one GET with a JSON content-type header, raced
//! against the request's cancellation token.
//!
//! ERROR HANDLING
//! ==============
//! Cancellation is reported as [`FetchError::Cancelled`] so callers can tell
//! a superseded request apart from a real failure and stay silent about it.

#[cfg(test)]
#[path = "fetch_test.rs"]
mod fetch_test;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

pub const CONTENT_TYPE: &str = "application/json;charset=utf-8";

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request was superseded before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// Transport-level failure (connect, reset, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("unexpected status {status}")]
    Status { status: u16, body: String },

    /// The body was not valid JSON.
    #[error("malformed response body: {0}")]
    Parse(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
}

impl FetchError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Something that can GET a URL and parse the body as JSON.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` as JSON.
    ///
    /// Implementations should stop early with [`FetchError::Cancelled`] once
    /// `cancel` fires. Callers re-check the token anyway, so an
    /// implementation that ignores it is still correct, just wasteful.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] describing why no JSON body is available.
    async fn get_json(&self, url: &str, cancel: &CancellationToken) -> Result<Value, FetchError>;
}

// =============================================================================
// REQWEST IMPLEMENTATION
// =============================================================================

pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientBuild`] if the TLS backend fails to load.
    pub fn new(config: &AppConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| FetchError::ClientBuild(e.to_string()))?;
        Ok(Self { http })
    }

    async fn send(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), body: text });
        }

        parse_body(&text)
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn get_json(&self, url: &str, cancel: &CancellationToken) -> Result<Value, FetchError> {
        tokio::select! {
            () = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.send(url) => result,
        }
    }
}

fn parse_body(text: &str) -> Result<Value, FetchError> {
    serde_json::from_str(text).map_err(|e| FetchError::Parse(e.to_string()))
}
