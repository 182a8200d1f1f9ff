//! `HttpClient` over reqwest.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{DownloadStream, HttpClient, HttpMethod, HttpRequest, HttpResponse},
};
use futures_util::TryStreamExt;
use reqwest::{Client, RequestBuilder, Response};
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

/// Pooled reqwest client.
///
/// Only the connect phase has a client-wide timeout. Audio bodies can take
/// minutes, so the download manager bounds each attempt itself.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::with_connect_timeout(Duration::from_secs(10))
    }

    pub fn with_connect_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(timeout)
            .pool_max_idle_per_host(4)
            .user_agent(concat!("playback-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                Client::new()
            });

        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn prepare(&self, request: HttpRequest) -> RequestBuilder {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };

        let mut builder = self.client.request(method, &request.url);
        for (key, value) in request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    async fn send(&self, request: HttpRequest) -> Result<Response> {
        let url = request.url.clone();
        self.prepare(request)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> BridgeError {
    let kind = if e.is_timeout() {
        "timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "transfer failed"
    };
    BridgeError::Network(format!("{} {}: {}", url, kind, e))
}

/// Statuses worth another attempt later.
fn is_transient(status: u16) -> bool {
    status >= 500 || status == 429
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        let response = self.send(request).await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| transport_error(&url, e))?;

        debug!(%url, status, bytes = body.len(), "HTTP request finished");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn download_stream(&self, request: HttpRequest) -> Result<DownloadStream> {
        let url = request.url.clone();
        let response = self.send(request).await?;

        let status = response.status().as_u16();
        if is_transient(status) {
            return Err(BridgeError::Network(format!("HTTP {} for {}", status, url)));
        }
        if !response.status().is_success() {
            return Err(BridgeError::OperationFailed(format!(
                "HTTP {} for {}",
                status, url
            )));
        }

        let content_length = response.content_length();
        debug!(%url, status, content_length, "Opened download stream");

        let body = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::ConnectionAborted, e));

        Ok(DownloadStream {
            status,
            content_length,
            reader: Box::new(tokio_util::io::StreamReader::new(body)),
        })
    }
}
