//! Request descriptors for paginated endpoints
//!
//! A descriptor is created once per partition per run. Page requests are
//! derived from it with [`RequestDescriptor::for_page`]; the template itself is
//! never mutated.

use crate::collector::CollectionError;
use chrono::Utc;
use url::Url;

/// Query parameter names used to address one page of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingParams {
    /// Parameter carrying the 1-based page number
    pub page: String,

    /// Parameter carrying the page size
    pub page_size: String,

    /// Cache-busting parameter set to the current Unix time in milliseconds
    pub freshness: Option<String>,
}

impl Default for PagingParams {
    fn default() -> Self {
        Self {
            page: "pageNo".to_string(),
            page_size: "pageSize".to_string(),
            freshness: Some("t".to_string()),
        }
    }
}

/// Immutable template for a page request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    endpoint: Url,
    params: Vec<(String, String)>,
    page_size: u32,
    partition: String,
    scope: Option<String>,
    paging: PagingParams,
    page_number: Option<u32>,
    freshness_token: Option<String>,
}

impl RequestDescriptor {
    /// Creates a descriptor for one partition of an endpoint
    pub fn new(endpoint: Url, partition: impl Into<String>, page_size: u32) -> Self {
        Self {
            endpoint,
            params: Vec::new(),
            page_size,
            partition: partition.into(),
            scope: None,
            paging: PagingParams::default(),
            page_number: None,
            freshness_token: None,
        }
    }

    /// Replaces the paging parameter names
    pub fn with_paging(mut self, paging: PagingParams) -> Self {
        self.paging = paging;
        self
    }

    /// Derives a descriptor with one more fixed query parameter
    ///
    /// An existing parameter with the same name is replaced.
    pub fn with_param(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        let mut next = self.clone();
        match next.params.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => next.params.push((key, value)),
        }
        next
    }

    /// Derives a descriptor with the parameters of a query string applied
    ///
    /// Every key named in `query` replaces all existing values of that key;
    /// repeated keys (`tag=a&tag=b`) are kept in order.
    pub fn with_query(&self, query: &str) -> Self {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut next = self.clone();
        next.params.retain(|(key, _)| !pairs.iter().any(|(k, _)| k == key));
        next.params.extend(pairs);
        next
    }

    /// Derives a descriptor narrowed to a sub-listing of the partition
    /// (for example one token of a chain)
    pub fn with_scope(&self, scope: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.scope = Some(scope.into());
        next
    }

    /// Derives the request for a single page, stamped with a fresh token
    pub fn for_page(&self, page: u32) -> Self {
        let mut next = self.clone();
        next.page_number = Some(page);
        next.freshness_token = Some(Utc::now().timestamp_millis().to_string());
        next
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn paging(&self) -> &PagingParams {
        &self.paging
    }

    pub fn page_number(&self) -> Option<u32> {
        self.page_number
    }

    pub fn freshness_token(&self) -> Option<&str> {
        self.freshness_token.as_deref()
    }

    /// Short label for log lines: `partition` or `partition/scope`
    pub fn label(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}/{}", self.partition, scope),
            None => self.partition.clone(),
        }
    }

    /// Renders the full request URL
    ///
    /// Fixed parameters come first, followed by the page size, the page
    /// number (when set) and the freshness token (when set).
    pub fn url(&self) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
            pairs.append_pair(&self.paging.page_size, &self.page_size.to_string());
            if let Some(page) = self.page_number {
                pairs.append_pair(&self.paging.page, &page.to_string());
            }
            if let (Some(name), Some(token)) = (&self.paging.freshness, &self.freshness_token) {
                pairs.append_pair(name, token);
            }
        }
        url
    }

    /// Checks the preconditions of a collection run
    pub fn validate(&self) -> Result<(), CollectionError> {
        if self.page_size == 0 {
            return Err(CollectionError::InvalidArgument(
                "page size must be greater than zero".to_string(),
            ));
        }

        if self.partition.trim().is_empty() {
            return Err(CollectionError::InvalidArgument(
                "partition key cannot be empty".to_string(),
            ));
        }

        if self.paging.page.is_empty() || self.paging.page_size.is_empty() {
            return Err(CollectionError::InvalidArgument(format!(
                "paging parameter names cannot be empty for partition {}",
                self.partition
            )));
        }

        Ok(())
    }
}
