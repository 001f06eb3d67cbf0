//! Adapter interfaces for external systems.
//!
//! The core never talks to the network directly: manifests and overlay
//! scripts are fetched through a [`Fetcher`], which the HTTP adapter
//! implements and tests replace with in-memory fakes.

pub mod http;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

// Re-export the HTTP adapter
pub use http::{resolve_url, HttpFetcher};

/// Errors loading a remote document
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to parse JSON from {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Returns `true` if retrying might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http { .. } => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Trait for fetching documents by URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw bytes at `url`
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;

    /// Fetch and parse a JSON document
    async fn fetch_json(&self, url: &str) -> Result<Value, FetchError> {
        let bytes = self.fetch_bytes(url).await?;
        serde_json::from_slice(&bytes).map_err(|source| FetchError::Parse {
            url: url.to_string(),
            source,
        })
    }
}
