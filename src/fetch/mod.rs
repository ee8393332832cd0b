//! Network fetch abstraction for tile and all-sky imagery.
//!
//! The cache only needs `fetch(url) -> bytes-or-error`; everything else
//! (timeouts, retry/backoff, authentication) belongs to the implementation
//! behind the [`TileFetcher`] trait. The trait keeps the cache testable
//! with a mock client and keeps reqwest out of the hot path's signature.

use thiserror::Error;

/// Errors surfaced by a fetch attempt.
///
/// The cache treats every variant the same way (negative-cache the tile);
/// the distinction exists for logging and for implementations that want to
/// apply different backoff per class.
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Transport-level failure (DNS, TLS, connection, read).
    #[error("network error: {0}")]
    Network(String),
}

/// Blocking byte fetcher for survey imagery.
///
/// Implementations must be cheap to share across threads; the cache runs
/// them on a blocking-task pool, never on the render thread.
pub trait TileFetcher: Send + Sync {
    /// Fetches the resource at `url` and returns its raw bytes.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`TileFetcher`] backed by a blocking reqwest client.
pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

impl ReqwestFetcher {
    /// Creates a fetcher with a 30 second request timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(std::time::Duration::from_secs(30))
    }

    /// Creates a fetcher with a custom request timeout.
    pub fn with_timeout(timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl TileFetcher for ReqwestFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| FetchError::Network(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Network(format!("failed to read response: {e}")))
    }
}
