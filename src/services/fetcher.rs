//! Fetch collaborator
//!
//! The engine only sees the [`Fetcher`] trait. [`HttpFetcher`] is the
//! production implementation: one attempt per call, size-limited streaming
//! download, `file://` URLs read from disk.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::error::FetchError;
use crate::services::xtream::redact_password;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the raw body behind `url`
    async fn fetch(&self, url: &str, user_agent: Option<&str>) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: Client,
    max_size_mb: usize,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout_ms: u64, max_size_mb: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_millis(timeout_ms))
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_size_mb,
        })
    }

    fn max_bytes(&self) -> u64 {
        (self.max_size_mb as u64) * 1024 * 1024
    }

    fn too_large(&self, size_bytes: u64) -> FetchError {
        FetchError::TooLarge {
            size_bytes,
            limit_mb: self.max_size_mb,
        }
    }

    async fn fetch_file(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|_| FetchError::Network(format!("Invalid file URL: {}", url)))?;

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| FetchError::Network(format!("{}: {}", path.display(), e)))?;
        if meta.len() > self.max_bytes() {
            return Err(self.too_large(meta.len()));
        }

        tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::Network(format!("{}: {}", path.display(), e)))
    }

    async fn fetch_http(&self, url: &Url, user_agent: Option<&str>) -> Result<Vec<u8>, FetchError> {
        let mut request = self.client.get(url.as_str());
        if let Some(ua) = user_agent.filter(|ua| !ua.trim().is_empty()) {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(
                "Fetch of {} returned HTTP {}",
                redact_password(url.as_str()),
                status.as_u16()
            );
            return Err(FetchError::Status(status.as_u16()));
        }

        let max_bytes = self.max_bytes();
        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(self.too_large(len));
            }
            tracing::debug!(
                "Fetching {} ({:.2} MB)",
                redact_password(url.as_str()),
                len as f64 / 1024.0 / 1024.0
            );
        }

        // Content-Length is optional, so enforce the limit while streaming
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            if body.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(self.too_large(body.len() as u64 + chunk.len() as u64));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() {
        FetchError::Network("Connection failed - server unreachable".to_string())
    } else {
        FetchError::Network(err.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, user_agent: Option<&str>) -> Result<Vec<u8>, FetchError> {
        let parsed =
            Url::parse(url).map_err(|e| FetchError::Network(format!("Invalid URL {}: {}", url, e)))?;

        match parsed.scheme() {
            "http" | "https" => self.fetch_http(&parsed, user_agent).await,
            "file" => self.fetch_file(&parsed).await,
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }
}
