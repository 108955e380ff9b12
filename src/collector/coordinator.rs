//! Paginated collection orchestration
//!
//! This module contains the collection flow for one partition:
//! - Discovering the total record count from page 1
//! - Fanning pages 2..N out through the [`ConcurrencyLimiter`]
//! - Retrying each page through the [`RetryPolicy`]
//! - Folding settled pages into the partition's [`Accumulator`]
//! - Finalizing the accumulator into a deduplicated [`ResultSet`]

use crate::collector::merge::{finalize, merge};
use crate::collector::retry::RetryError;
use crate::collector::{
    CollectionError, ConcurrencyLimiter, FetchError, PageFetcher, RetryPolicy,
};
use crate::config::CollectorConfig;
use crate::model::{total_pages, Accumulator, DuplicatePolicy, Page, Record, RequestDescriptor, ResultSet};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tuning knobs for a collection run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectorOptions {
    /// Ceiling on concurrent page fetches
    pub max_concurrency: usize,

    /// Retry applied to every page fetch, discovery included
    pub retry: RetryPolicy,

    /// Upper bound on a single fetch attempt
    pub per_fetch_timeout: Option<Duration>,

    /// How duplicate identities are resolved
    pub duplicate_policy: DuplicatePolicy,

    /// Ceiling on pages fetched per partition
    pub max_pages: Option<u32>,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            max_concurrency: ConcurrencyLimiter::DEFAULT_MAX_IN_FLIGHT,
            retry: RetryPolicy::default(),
            per_fetch_timeout: None,
            duplicate_policy: DuplicatePolicy::FirstSeen,
            max_pages: None,
        }
    }
}

impl From<&CollectorConfig> for CollectorOptions {
    fn from(config: &CollectorConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            retry: config.retry_policy(),
            per_fetch_timeout: config.per_fetch_timeout(),
            duplicate_policy: config.duplicate_policy,
            max_pages: Some(config.max_pages),
        }
    }
}

/// A page that was skipped after exhausting its retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LostPage {
    pub page: u32,
    /// Sub-listing the page belonged to, for seeded collections
    pub scope: Option<String>,
    pub attempts: u32,
    pub reason: String,
}

/// What happened while collecting one partition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionSummary {
    pub partition: String,

    /// Total records announced by the discovery page(s)
    pub total: u64,

    /// Pages the run set out to fetch
    pub total_pages: u32,

    /// Pages that were fetched and folded in
    pub pages_fetched: u32,

    pub lost_pages: Vec<LostPage>,

    /// Sub-listings (seeds or variants) whose whole collection failed
    pub lost_scopes: Vec<String>,

    /// Records received before deduplication
    pub records_received: usize,

    /// Records left after deduplication
    pub unique_records: usize,

    /// Pages announced by the provider but left out by the page ceiling
    pub pages_beyond_cap: u32,
}

impl PartitionSummary {
    pub fn new(partition: &str) -> Self {
        Self {
            partition: partition.to_string(),
            ..Self::default()
        }
    }

    /// False when any page or seed was lost (degraded completeness)
    pub fn is_complete(&self) -> bool {
        self.lost_pages.is_empty() && self.lost_scopes.is_empty() && self.pages_beyond_cap == 0
    }

    fn absorb(&mut self, other: PartitionSummary) {
        self.total += other.total;
        self.total_pages += other.total_pages;
        self.pages_fetched += other.pages_fetched;
        self.records_received += other.records_received;
        self.pages_beyond_cap += other.pages_beyond_cap;
        self.lost_pages.extend(other.lost_pages);
        self.lost_scopes.extend(other.lost_scopes);
    }
}

/// The finalized result of one partition
#[derive(Debug, Clone)]
pub struct Collection<T> {
    pub result: ResultSet<T>,
    pub summary: PartitionSummary,
}

/// Collects every page of a paginated listing
pub struct PaginatedCollector<T> {
    fetcher: Arc<dyn PageFetcher<T>>,
    options: CollectorOptions,
    cancel: CancellationToken,
}

impl<T: Record> PaginatedCollector<T> {
    /// Creates a collector over a fetcher
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Transport used for every page request
    /// * `options` - Concurrency, retry, timeout and duplicate settings
    pub fn new(fetcher: Arc<dyn PageFetcher<T>>, options: CollectorOptions) -> Self {
        Self {
            fetcher,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Attaches an external cancellation signal
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &CollectorOptions {
        &self.options
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Collects one partition
    ///
    /// # Flow
    ///
    /// 1. Validate the descriptor and options
    /// 2. Fetch page 1 (with retries, outside the limiter) to learn the total
    /// 3. Fan pages 2..N out in batches, folding each page as it settles
    /// 4. Skip pages that exhaust their retries and record them as lost
    /// 5. Finalize the accumulator
    ///
    /// # Returns
    ///
    /// * `Ok(Collection)` - Possibly degraded; see [`PartitionSummary::is_complete`]
    /// * `Err(CollectionError::InvalidArgument)` - Precondition violated, nothing fetched
    /// * `Err(CollectionError::DiscoveryFailed)` - Page 1 failed, no fan-out issued
    /// * `Err(CollectionError::Cancelled)` - Cancelled before every page settled
    pub async fn collect(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Collection<T>, CollectionError> {
        descriptor.validate()?;
        let limiter = ConcurrencyLimiter::new(self.options.max_concurrency)?;
        let partition = descriptor.partition().to_string();
        let label = descriptor.label();

        if self.cancel.is_cancelled() {
            return Err(CollectionError::Cancelled { partition });
        }

        let discovery = self
            .fetch_with_retry(descriptor.for_page(1))
            .await
            .map_err(|failure| match failure {
                RetryError::Fatal { error, .. } => {
                    CollectionError::InvalidArgument(error.to_string())
                }
                RetryError::Cancelled { .. } => CollectionError::Cancelled {
                    partition: partition.clone(),
                },
                RetryError::Exhausted {
                    attempts,
                    last_error,
                } => CollectionError::DiscoveryFailed {
                    partition: label.clone(),
                    attempts,
                    source: last_error,
                },
            })?;

        let (total, page_count) = match discovery.total {
            Some(total) => (total, total_pages(total, descriptor.page_size())),
            None => {
                tracing::warn!(
                    "Discovery page for {} carried no total, treating it as the only page",
                    label
                );
                (discovery.len() as u64, 1)
            }
        };

        let mut summary = PartitionSummary::new(&partition);
        let page_count = match self.options.max_pages {
            Some(cap) if page_count > cap => {
                tracing::warn!(
                    "{} announces {} page(s); collecting only the first {}",
                    label,
                    page_count,
                    cap
                );
                summary.pages_beyond_cap = page_count - cap;
                cap
            }
            _ => page_count,
        };
        summary.total = total;
        summary.total_pages = page_count.max(1);
        summary.pages_fetched = 1;

        let mut accumulator = Accumulator::new();
        summary.records_received += accumulator.fold(&partition, discovery.records);

        tracing::debug!(
            "Discovered {} record(s) over {} page(s) for {}",
            total,
            page_count,
            label
        );

        if page_count > 1 {
            let mut interrupted = false;
            let tasks = (2..=page_count).map(|page| {
                let request = descriptor.for_page(page);
                move || async move { (page, self.fetch_with_retry(request).await) }
            });

            let report = limiter
                .run_each(tasks, &self.cancel, |(page, outcome)| match outcome {
                    Ok(fetched) => {
                        summary.pages_fetched += 1;
                        summary.records_received += accumulator.fold(&partition, fetched.records);
                    }
                    Err(RetryError::Cancelled { .. }) => interrupted = true,
                    Err(failure) => {
                        let attempts = failure.attempts();
                        let error = CollectionError::PageFetchExhausted {
                            partition: label.clone(),
                            page,
                            attempts,
                            source: failure.into_inner(),
                        };
                        tracing::warn!("{}; continuing without it", error);
                        summary.lost_pages.push(LostPage {
                            page,
                            scope: descriptor.scope().map(str::to_string),
                            attempts,
                            reason: error.to_string(),
                        });
                    }
                })
                .await;

            if !report.is_complete() || interrupted {
                tracing::info!(
                    "Collection of {} cancelled with {} page(s) undispatched",
                    label,
                    report.undispatched
                );
                return Err(CollectionError::Cancelled { partition });
            }
        }

        let result = finalize(&accumulator, self.options.duplicate_policy);
        summary.unique_records = result.len();

        tracing::info!(
            "Collected {}: {} unique of {} received, {}/{} page(s), {} lost",
            label,
            summary.unique_records,
            summary.records_received,
            summary.pages_fetched,
            summary.total_pages,
            summary.lost_pages.len()
        );

        Ok(Collection { result, summary })
    }

    /// Collects several partitions concurrently
    ///
    /// Partitions share no mutable state; a failure in one never affects the
    /// others. Outcomes are returned in descriptor order.
    pub async fn collect_partitions(
        &self,
        descriptors: &[RequestDescriptor],
    ) -> Vec<(String, Result<Collection<T>, CollectionError>)> {
        join_all(descriptors.iter().map(|descriptor| async move {
            (
                descriptor.partition().to_string(),
                self.collect(descriptor).await,
            )
        }))
        .await
    }

    /// Collects one sub-listing per seed and merges them under the partition
    ///
    /// Each seed value is set as query parameter `param` on `base`. Seeds run
    /// through `limiter`; a seed whose collection fails is recorded as lost.
    /// Sub-results are merged in seed order.
    pub async fn collect_seeded(
        &self,
        base: &RequestDescriptor,
        param: &str,
        seeds: &[String],
        limiter: &ConcurrencyLimiter,
    ) -> Result<Collection<T>, CollectionError> {
        let scopes = seeds
            .iter()
            .map(|seed| {
                let request = base.with_param(param, seed.as_str()).with_scope(seed.as_str());
                (seed.clone(), request)
            })
            .collect();

        self.collect_scoped(base, scopes, limiter).await
    }

    /// Collects one request variant per query string and merges them
    ///
    /// Each variant's parameters are applied on top of `base`; an empty
    /// variant requests `base` unchanged. Variants are merged in the order
    /// given.
    pub async fn collect_variants(
        &self,
        base: &RequestDescriptor,
        variants: &[String],
        limiter: &ConcurrencyLimiter,
    ) -> Result<Collection<T>, CollectionError> {
        let scopes = variants
            .iter()
            .map(|query| {
                let scope = variant_scope(query);
                let request = base.with_query(query).with_scope(scope.as_str());
                (scope, request)
            })
            .collect();

        self.collect_scoped(base, scopes, limiter).await
    }

    async fn collect_scoped(
        &self,
        base: &RequestDescriptor,
        scopes: Vec<(String, RequestDescriptor)>,
        limiter: &ConcurrencyLimiter,
    ) -> Result<Collection<T>, CollectionError> {
        base.validate()?;
        let partition = base.partition().to_string();

        let mut summary = PartitionSummary::new(&partition);
        let mut settled: Vec<Option<Result<Collection<T>, CollectionError>>> =
            scopes.iter().map(|_| None).collect();

        let tasks = scopes.iter().enumerate().map(|(index, (_, request))| {
            move || async move { (index, self.collect(request).await) }
        });

        let report = limiter
            .run_each(tasks, &self.cancel, |(index, outcome)| {
                settled[index] = Some(outcome);
            })
            .await;

        if !report.is_complete() || self.cancel.is_cancelled() {
            return Err(CollectionError::Cancelled { partition });
        }

        // Declaration order, not completion order, decides first-seen ties
        let mut results = Vec::new();
        for ((scope, _), outcome) in scopes.iter().zip(settled) {
            match outcome {
                Some(Ok(collection)) => {
                    summary.absorb(collection.summary);
                    results.push(collection.result);
                }
                Some(Err(error)) => {
                    tracing::warn!("Scope {} of {} lost: {}", scope, partition, error);
                    summary.lost_scopes.push(scope.clone());
                }
                None => summary.lost_scopes.push(scope.clone()),
            }
        }

        let result = merge(results, self.options.duplicate_policy);
        summary.unique_records = result.len();

        tracing::info!(
            "Collected {} from {} scope(s): {} unique of {} received, {} scope(s) lost",
            partition,
            scopes.len(),
            summary.unique_records,
            summary.records_received,
            summary.lost_scopes.len()
        );

        Ok(Collection { result, summary })
    }

    /// Fetches one page, applying the per-attempt timeout and retry policy
    ///
    /// Retrying stops once the collector's token is cancelled.
    async fn fetch_with_retry(
        &self,
        request: RequestDescriptor,
    ) -> Result<Page<T>, RetryError<FetchError>> {
        let request = &request;
        self.options
            .retry
            .attempt_until_cancelled(&self.cancel, |attempt| async move {
                tracing::trace!(
                    "Fetching page {:?} of {} (attempt {})",
                    request.page_number(),
                    request.label(),
                    attempt
                );
                match self.options.per_fetch_timeout {
                    Some(limit) => tokio::time::timeout(limit, self.fetcher.fetch(request))
                        .await
                        .unwrap_or_else(|_| {
                            Err(FetchError::Timeout {
                                url: request.url().to_string(),
                            })
                        }),
                    None => self.fetcher.fetch(request).await,
                }
            })
            .await
    }
}

/// Scope label of a request variant: its query string, or `default`
fn variant_scope(query: &str) -> String {
    match query.trim() {
        "" => "default".to_string(),
        query => query.to_string(),
    }
}
