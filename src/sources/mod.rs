//! Platform adapters with an extensible trait-based architecture.
//!
//! This module defines the [`Source`] trait that every citation platform
//! implements. An adapter turns an [`AuthorRef`] into a lazy, finite stream of
//! [`RawRecord`]s; pagination happens as the stream is polled, so a consumer
//! that stops early never issues the remaining page requests.
//!
//! Adapters are selected by configuration through the [`SourceRegistry`]:
//! each `[platforms.<id>]` table with `enabled = true` contributes one
//! adapter. Google Scholar has no public API and is scraped, so it ships
//! disabled.
//!
//! # Errors
//!
//! Adapters classify failures so the fetch pipeline can decide what to do:
//!
//! - [`SourceError::RateLimited`] and [`SourceError::Timeout`] are retried
//!   with exponential backoff (see [`crate::utils::with_retry`])
//! - [`SourceError::PlatformUnavailable`] skips the platform for this cycle
//! - everything else is reported in the fetch summary

mod arxiv;
mod crossref;
mod google_scholar;
mod orcid;
mod registry;
mod semantic;

pub mod mock;

pub use arxiv::ArxivSource;
pub use crossref::CrossRefSource;
pub use google_scholar::GoogleScholarSource;
pub use mock::MockSource;
pub use orcid::OrcidSource;
pub use registry::{SourceCapabilities, SourceRegistry};
pub use semantic::SemanticScholarSource;

use crate::models::{AuthorRef, Platform, RawRecord};
use crate::utils::{HttpClient, RetryConfig};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::time::Duration;

/// Lazy stream of records produced by one adapter
pub type RecordStream<'a> = BoxStream<'a, Result<RawRecord, SourceError>>;

/// Settings every adapter is constructed with
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub http: HttpClient,
    pub retry: RetryConfig,
    pub page_size: u32,
    /// Pause between page requests
    pub page_delay: Duration,
    pub api_key: Option<String>,
    /// Overrides the platform's public API base URL
    pub base_url: Option<String>,
}

impl SourceOptions {
    pub fn new(http: HttpClient, retry: RetryConfig) -> Self {
        Self {
            http,
            retry,
            page_size: 100,
            page_delay: Duration::ZERO,
            api_key: None,
            base_url: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// The configured base URL, or `default` without a trailing slash
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    /// Sleep for the configured page delay, if any
    pub async fn pause(&self) {
        if !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }
    }
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self::new(HttpClient::default(), RetryConfig::default())
    }
}

/// The Source trait defines the interface for all platform adapters.
///
/// # Implementing a New Source
///
/// 1. Create a struct holding its [`SourceOptions`]
/// 2. Implement `id`, `name`, `platform` and `fetch`
/// 3. Override `capabilities` (and `lookup_doi`) if the platform supports more
/// 4. Add it to [`SourceRegistry::from_config`]
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Platform identifier (`"orcid"`, `"semantic_scholar"`, ...)
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// The platform records from this source are attributed to
    fn platform(&self) -> Platform;

    /// Describe the capabilities of this source
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::FETCH
    }

    /// Whether records from this source carry citation counts
    fn reports_citations(&self) -> bool {
        self.capabilities()
            .contains(SourceCapabilities::CITATION_COUNTS)
    }

    /// Whether this source supports lookup by DOI
    fn supports_doi_lookup(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::DOI_LOOKUP)
    }

    /// Stream every publication of `author` known to this platform
    fn fetch<'a>(&'a self, author: &'a AuthorRef) -> RecordStream<'a>;

    /// Get a single record by its DOI
    async fn lookup_doi(&self, _doi: &str) -> Result<RawRecord, SourceError> {
        Err(SourceError::NotImplemented)
    }
}

/// Errors that can occur when interacting with a platform
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// The requested operation is not implemented for this source
    #[error("Operation not implemented for this source")]
    NotImplemented,

    /// Network or authentication failure; the platform is skipped for this cycle
    #[error("Platform unavailable: {0}")]
    PlatformUnavailable(String),

    /// Rate limit exceeded (with optional retry-after seconds)
    #[error("Rate limited{}", retry_after.map(|s| format!(" (retry after {}s)", s)).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    /// A request exceeded the per-request timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Parsing error (XML, JSON, HTML)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing author id, credential or similar
    #[error("Not configured: {0}")]
    NotConfigured(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl SourceError {
    /// Whether the failure is worth retrying after a pause
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::RateLimited { .. } | SourceError::Timeout(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(err.to_string())
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::PlatformUnavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_capabilities() {
        let caps = SourceCapabilities::FETCH | SourceCapabilities::CITATION_COUNTS;

        assert!(caps.contains(SourceCapabilities::FETCH));
        assert!(caps.contains(SourceCapabilities::CITATION_COUNTS));
        assert!(!caps.contains(SourceCapabilities::DOI_LOOKUP));
    }

    #[test]
    fn test_transient_classification() {
        assert!(SourceError::RateLimited { retry_after: None }.is_transient());
        assert!(SourceError::Timeout("slow".into()).is_transient());
        assert!(!SourceError::PlatformUnavailable("401".into()).is_transient());
        assert!(!SourceError::Parse("bad".into()).is_transient());
    }

    #[test]
    fn test_rate_limited_display() {
        assert_eq!(
            SourceError::RateLimited {
                retry_after: Some(30)
            }
            .to_string(),
            "Rate limited (retry after 30s)"
        );
        assert_eq!(
            SourceError::RateLimited { retry_after: None }.to_string(),
            "Rate limited"
        );
    }
}
