//! HTTP fetcher backed by reqwest.

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use super::{FetchError, Fetcher};

/// Fetches documents over HTTP(S)
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a fetcher that sends a custom User-Agent
    pub fn with_user_agent(user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!(%url, "Fetching");
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;

        Ok(bytes.to_vec())
    }
}

/// Resolve `href` against the URL of the document that referenced it.
///
/// Absolute hrefs are returned unchanged. A relative href needs a base.
pub fn resolve_url(base: Option<&str>, href: &str) -> Result<String, FetchError> {
    if Url::parse(href).is_ok() {
        return Ok(href.to_string());
    }

    let invalid = |reason: String| FetchError::InvalidUrl {
        url: href.to_string(),
        reason,
    };

    let base = base.ok_or_else(|| invalid("relative URL without a base".to_string()))?;
    let base = Url::parse(base).map_err(|e| invalid(format!("bad base `{}`: {}", base, e)))?;
    let joined = base.join(href).map_err(|e| invalid(e.to_string()))?;

    Ok(joined.to_string())
}
