//! Collector module for paginated listings
//!
//! This module contains the collection engine:
//! - Page fetchers over HTTP or on-disk fixtures
//! - Bounded retry of individual page fetches
//! - Batch-synchronized concurrency limiting
//! - Discovery and fan-out of a partition's pages
//! - Deduplication, merging and history diffing of results
//! - Sweeps over every configured source

mod coordinator;
mod fetcher;
mod history;
mod merge;
mod parser;
mod retry;
mod scheduler;
mod sweep;
mod traits;

pub use coordinator::{Collection, CollectorOptions, LostPage, PaginatedCollector, PartitionSummary};
pub use fetcher::{build_fetcher, build_http_client, FixturePageFetcher, HttpPageFetcher};
pub use history::{collect_and_diff, diff_and_save, load_history_or_empty, HistoryState};
pub use merge::{diff_new, finalize, finalize_partitions, merge};
pub use parser::{extract_json_document, parse_page};
pub use retry::{RetryError, RetryPolicy, Retryable};
pub use scheduler::{BatchRun, ConcurrencyLimiter, DispatchReport};
pub use sweep::{descriptor_for, run_sweep, PartitionOutcome, PartitionReport, SweepReport};
pub use traits::{CollectionError, FetchError, PageFetcher};

pub(crate) use merge::dedupe_and_sort;
