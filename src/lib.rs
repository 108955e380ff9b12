//! Smart-Sweep: a paginated ranked-list collector
//!
//! This crate collects ranked address lists from paginated JSON endpoints,
//! fanning page requests out under a concurrency ceiling, retrying transient
//! failures, and merging the deduplicated result against previous runs.

pub mod collector;
pub mod config;
pub mod model;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Smart-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Collection error: {0}")]
    Collection(#[from] collector::CollectionError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid source '{source_name}': {message}")]
    InvalidSource {
        source_name: String,
        message: String,
    },
}

/// Result type alias for Smart-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use collector::{
    collect_and_diff, run_sweep, CollectionError, CollectorOptions, ConcurrencyLimiter,
    PaginatedCollector, RetryPolicy,
};
pub use config::Config;
pub use model::{
    Accumulator, AddressRecord, DuplicatePolicy, Page, Record, RequestDescriptor, ResultSet,
};
