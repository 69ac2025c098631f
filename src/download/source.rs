//! Remote resource sources
//!
//! A source hands out a cheap freshness token (used to decide whether a
//! cached copy is stale) and the full payload with the token it was served
//! under.

use crate::error::{AgendaError, AgendaResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

/// Payload downloaded from a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    /// Freshness token the payload was served under
    pub token: String,

    /// Raw bytes
    pub payload: Vec<u8>,
}

/// Remote resource abstraction
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// Human-readable identity, used in logs and errors
    fn describe(&self) -> String;

    /// Current freshness token without downloading the payload
    ///
    /// `None` means the source cannot tell, and the cached copy is treated
    /// as changed.
    async fn freshness_token(&self) -> AgendaResult<Option<String>>;

    /// Download the full payload
    async fn fetch(&self) -> AgendaResult<FetchedResource>;
}

/// Largest payload accepted from an HTTP source
pub const MAX_HTTP_PAYLOAD: u64 = 256 * 1024 * 1024;

/// HTTP(S) resource using `Last-Modified`, then `ETag`, as freshness token
#[derive(Clone)]
pub struct HttpSource {
    url: String,
    agent: ureq::Agent,
}

impl HttpSource {
    /// Create a source for `url` with the given request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            url: url.into(),
            agent: ureq::Agent::new_with_config(config),
        }
    }

    /// Resource URL
    pub fn url(&self) -> &str {
        &self.url
    }

    fn header_token(headers: &ureq::http::HeaderMap) -> Option<String> {
        ["last-modified", "etag"]
            .iter()
            .find_map(|name| headers.get(*name))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    async fn blocking<T, F>(&self, op: F) -> AgendaResult<T>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent, String) -> Result<T, ureq::Error> + Send + 'static,
    {
        let agent = self.agent.clone();
        let url = self.url.clone();
        tokio::task::spawn_blocking(move || op(agent, url))
            .await
            .map_err(|e| AgendaError::Internal(format!("HTTP worker failed: {}", e)))?
            .map_err(|e| AgendaError::fetch(self.url.clone(), e))
    }
}

#[async_trait]
impl ResourceSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn freshness_token(&self) -> AgendaResult<Option<String>> {
        let token = self
            .blocking(|agent, url| {
                let response = agent.head(&url).call()?;
                Ok(Self::header_token(response.headers()))
            })
            .await?;
        debug!("Freshness token for {}: {:?}", self.url, token);
        Ok(token)
    }

    async fn fetch(&self) -> AgendaResult<FetchedResource> {
        let (token, payload) = self
            .blocking(|agent, url| {
                let mut response = agent.get(&url).call()?;
                let token = Self::header_token(response.headers());
                let payload = response
                    .body_mut()
                    .with_config()
                    .limit(MAX_HTTP_PAYLOAD)
                    .read_to_vec()?;
                Ok((token, payload))
            })
            .await?;

        // No validator headers: fall back to a content hash, which never
        // matches a missing HEAD token, so the next check refetches
        let token = token.unwrap_or_else(|| content_token(&payload));
        debug!("Fetched {} ({} bytes)", self.url, payload.len());
        Ok(FetchedResource { token, payload })
    }
}

/// Token derived from the payload itself
pub fn content_token(payload: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_token_is_stable() {
        let a = content_token(b"slides");
        assert_eq!(a, content_token(b"slides"));
        assert_ne!(a, content_token(b"slides v2"));
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn header_token_prefers_last_modified() {
        let mut headers = ureq::http::HeaderMap::new();
        headers.insert("etag", "\"abc\"".parse().unwrap());
        assert_eq!(HttpSource::header_token(&headers).as_deref(), Some("\"abc\""));

        headers.insert(
            "last-modified",
            "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(
            HttpSource::header_token(&headers).as_deref(),
            Some("Wed, 21 Oct 2026 07:28:00 GMT")
        );
    }

    #[test]
    fn header_token_absent() {
        let headers = ureq::http::HeaderMap::new();
        assert!(HttpSource::header_token(&headers).is_none());
    }

    #[tokio::test]
    async fn unreachable_host_is_fetch_error() {
        let source = HttpSource::new("http://127.0.0.1:9/agenda.pdf", Duration::from_secs(2));
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, AgendaError::Fetch { .. }));
        assert_eq!(source.describe(), "http://127.0.0.1:9/agenda.pdf");
    }
}
