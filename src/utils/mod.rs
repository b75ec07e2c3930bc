//! Utility modules shared by the adapters and the CLI.
//!
//! - [`HttpClient`]: reqwest client with timeouts and status classification
//! - [`RetryConfig`] / [`with_retry`]: exponential backoff on transient errors
//! - [`truncate_with_ellipsis`] and friends: text formatting for tables
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use elephant::sources::SourceError;
//! use elephant::utils::{with_retry, RetryConfig};
//!
//! # async fn fetch_page() -> Result<String, SourceError> { Ok("page".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let body = with_retry(RetryConfig::default(), || fetch_page()).await?;
//! # Ok(())
//! # }
//! ```

mod display;
mod http;
mod retry;

pub use display::{format_authors, format_delta, truncate_at_word, truncate_with_ellipsis};
pub use http::{error_for_status, HttpClient};
pub use retry::{with_retry, RetryConfig, TransientError};
