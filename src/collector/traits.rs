//! Page fetcher trait and collection error types

use crate::collector::retry::Retryable;
use crate::model::{Page, RequestDescriptor};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a single page fetch
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Unexpected HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Bot challenge not cleared for {url}")]
    Challenge { url: String },

    #[error("Failed to parse page from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Failed to read fixture {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_))
    }
}

/// Errors raised by a collection run
#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Discovery failed for partition {partition} after {attempts} attempt(s): {source}")]
    DiscoveryFailed {
        partition: String,
        attempts: u32,
        source: FetchError,
    },

    #[error("Page {page} of partition {partition} failed after {attempts} attempt(s): {source}")]
    PageFetchExhausted {
        partition: String,
        page: u32,
        attempts: u32,
        source: FetchError,
    },

    #[error("Collection of partition {partition} was cancelled")]
    Cancelled { partition: String },
}

/// Capability to fetch one page and parse it into typed records
///
/// Implementations own their transport (HTTP client, fixture files, ...);
/// the collector only sees pages and errors.
#[async_trait]
pub trait PageFetcher<T>: Send + Sync {
    /// Fetches the page addressed by `descriptor`
    async fn fetch(&self, descriptor: &RequestDescriptor) -> Result<Page<T>, FetchError>;
}
