//! Page fetcher implementations
//!
//! This module provides the transports behind [`PageFetcher`]:
//! - [`HttpPageFetcher`]: live requests through a reqwest client
//! - [`FixturePageFetcher`]: pages replayed from JSON files on disk
//!
//! The transport is selected per source by configuration.

use crate::collector::parser::{extract_json_document, parse_page};
use crate::collector::{FetchError, PageFetcher};
use crate::config::{HttpConfig, LayoutConfig, SourceConfig, Transport};
use crate::model::{AddressRecord, Page, RequestDescriptor};
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The HTTP configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use smart_sweep::collector::build_http_client;
/// use smart_sweep::config::HttpConfig;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/html;q=0.9, */*;q=0.8"),
    );

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(Duration::from_millis(config.timeout_ms))
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages over HTTP
pub struct HttpPageFetcher {
    client: Client,
    layout: LayoutConfig,
}

impl HttpPageFetcher {
    pub fn new(client: Client, layout: LayoutConfig) -> Self {
        Self { client, layout }
    }
}

#[async_trait]
impl PageFetcher<AddressRecord> for HttpPageFetcher {
    /// Fetches one page
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | Timeout | `FetchError::Timeout` |
    /// | Connection/transport failure | `FetchError::Http` |
    /// | Malformed request, HTTP 400 | `FetchError::InvalidRequest` (not retried) |
    /// | Other non-2xx status | `FetchError::Status` |
    /// | HTML without a JSON `<pre>` | `FetchError::Challenge` |
    /// | Unexpected document shape | `FetchError::Parse` |
    async fn fetch(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Page<AddressRecord>, FetchError> {
        let url = descriptor.url();
        let url_str = url.to_string();

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_builder() {
                FetchError::InvalidRequest(format!("{}: {}", url_str, e))
            } else if e.is_timeout() {
                FetchError::Timeout {
                    url: url_str.clone(),
                }
            } else {
                FetchError::Http {
                    url: url_str.clone(),
                    source: e,
                }
            }
        })?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            return Err(FetchError::InvalidRequest(format!(
                "{} rejected the request parameters",
                url_str
            )));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url_str,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::Http {
            url: url_str.clone(),
            source: e,
        })?;

        let document =
            extract_json_document(&body).ok_or_else(|| FetchError::Challenge {
                url: url_str.clone(),
            })?;

        parse_page(&document, &self.layout, descriptor.partition())
            .map_err(|message| FetchError::Parse { url: url_str, message })
    }
}

/// Replays pages from `<root>/<partition>[/<scope>]/page-<n>.json`
pub struct FixturePageFetcher {
    root: PathBuf,
    layout: LayoutConfig,
}

impl FixturePageFetcher {
    pub fn new(root: impl Into<PathBuf>, layout: LayoutConfig) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    fn page_path(&self, descriptor: &RequestDescriptor) -> PathBuf {
        let mut path = self.root.join(descriptor.partition());
        if let Some(scope) = descriptor.scope() {
            path = path.join(scope);
        }
        path.join(format!("page-{}.json", descriptor.page_number().unwrap_or(1)))
    }
}

#[async_trait]
impl PageFetcher<AddressRecord> for FixturePageFetcher {
    async fn fetch(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Page<AddressRecord>, FetchError> {
        let path = self.page_path(descriptor);
        let path_str = path.display().to_string();

        let body = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| FetchError::Io {
                path: path_str.clone(),
                source: e,
            })?;

        let document = extract_json_document(&body).ok_or_else(|| FetchError::Parse {
            url: path_str.clone(),
            message: "no JSON document in fixture".to_string(),
        })?;

        parse_page(&document, &self.layout, descriptor.partition())
            .map_err(|message| FetchError::Parse { url: path_str, message })
    }
}

/// Builds the fetcher selected by a source's `transport`
pub fn build_fetcher(
    source: &SourceConfig,
    http: &HttpConfig,
) -> Result<Arc<dyn PageFetcher<AddressRecord>>, crate::SweepError> {
    match source.transport {
        Transport::Http => {
            let client = build_http_client(http)?;
            Ok(Arc::new(HttpPageFetcher::new(client, source.layout.clone())))
        }
        Transport::Fixture => {
            let dir = source.fixture_dir.as_deref().ok_or_else(|| {
                ConfigError::InvalidSource {
                    source_name: source.name.clone(),
                    message: "fixture transport requires fixture-dir".to_string(),
                }
            })?;
            Ok(Arc::new(FixturePageFetcher::new(dir, source.layout.clone())))
        }
    }
}
