//! HTTP transport interface and the default reqwest implementation.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

/// HTTP transport failure.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Opaque "GET URL → bytes" client consumed by the fetch pipeline.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the body at `url`; non-2xx statuses are errors.
    async fn download(&self, url: &Url) -> Result<Bytes, HttpError>;
}

/// Default client backed by a shared [`reqwest::Client`].
#[derive(Clone, Default)]
pub struct ReqwestClient {
    http: reqwest::Client,
}

impl ReqwestClient {
    /// Create a client with reqwest's default configuration.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn download(&self, url: &Url) -> Result<Bytes, HttpError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| HttpError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}
