//! HTTP client utilities.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::sources::SourceError;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with per-request and connect timeouts
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a new HTTP client with the given timeouts
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self, SourceError> {
        Self::with_user_agent(USER_AGENT, timeout, connect_timeout)
    }

    /// Create a new HTTP client with a custom user agent
    pub fn with_user_agent(
        user_agent: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::InvalidRequest(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Get the underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Start a GET request
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    /// Send a request and classify transport and status failures
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, SourceError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        Err(error_for_status(status, response.headers(), &url))
    }

    /// Send a request and deserialize a JSON body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, SourceError> {
        let body = self.send_text(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Send a request and read the body as text
    pub async fn send_text(&self, request: RequestBuilder) -> Result<String, SourceError> {
        let response = self.send(request).await?;
        Ok(response.text().await?)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client: Arc::new(client),
        }
    }
}

/// Map a non-success HTTP status to the error taxonomy
pub fn error_for_status(status: StatusCode, headers: &HeaderMap, url: &str) -> SourceError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimited {
            retry_after: retry_after_secs(headers),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            SourceError::Timeout(format!("{} returned {}", url, status))
        }
        StatusCode::NOT_FOUND => SourceError::NotFound(url.to_string()),
        StatusCode::BAD_REQUEST => SourceError::InvalidRequest(format!("{} returned {}", url, status)),
        _ => SourceError::PlatformUnavailable(format!("{} returned {}", url, status)),
    }
}

/// Seconds from a `Retry-After` header, if it carries a delta
fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
