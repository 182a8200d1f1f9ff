//! HTTP seam: buffered requests for small assets and resumable byte streams
//! for offline downloads.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    /// Bound on the whole exchange, body included.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Ask for the resource from byte `offset` on (`Range: bytes=<offset>-`).
    /// Zero leaves the request untouched.
    pub fn resume_from(self, offset: u64) -> Self {
        if offset == 0 {
            self
        } else {
            self.header("Range", format!("bytes={}-", offset))
        }
    }

    /// JSON body, as sent to the settings endpoint.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(body)
            .map_err(|e| BridgeError::OperationFailed(format!("cannot encode body: {}", e)))?;
        self.body = Some(Bytes::from(encoded));
        Ok(self.header("Content-Type", "application/json"))
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| BridgeError::OperationFailed(format!("cannot decode body: {}", e)))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Attempt budget and exponential backoff for a retried operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Pause before retry number `retry` (1-based): `base * 2^(retry-1)`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Streamed response body.
///
/// `206` means the server honoured the `Range` header and `reader` starts at
/// the requested offset; `200` means it starts at byte zero.
pub struct DownloadStream {
    pub status: u16,
    /// Length of this response's body, when announced.
    pub content_length: Option<u64>,
    pub reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
}

impl DownloadStream {
    pub fn is_partial(&self) -> bool {
        self.status == 206
    }
}

impl fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadStream")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Host HTTP stack.
///
/// Transport failures, `5xx` and `429` must come back as
/// [`BridgeError::Network`]; the download manager retries exactly those.
/// Other non-success statuses on `download_stream` are
/// [`BridgeError::OperationFailed`]. Implementations do not retry on their
/// own.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send the request and buffer the whole body. Any status is returned
    /// as a response.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Open a streamed download, forwarding any `Range` header.
    async fn download_stream(&self, request: HttpRequest) -> Result<DownloadStream>;
}
