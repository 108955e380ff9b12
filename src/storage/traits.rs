//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{Record, ResultSet};
use crate::storage::{PartitionRunRecord, RunRecord, RunStatus, StoredResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("No history saved under key: {0}")]
    HistoryNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// History is read and written only at run boundaries: once before a
/// partition's result is diffed and once after.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new sweep run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status and finish timestamp of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Records the outcome of one partition of a run
    fn record_partition_run(&mut self, record: &PartitionRunRecord) -> StorageResult<()>;

    /// Gets the partition outcomes of a run
    fn get_partition_runs(&self, run_id: i64) -> StorageResult<Vec<PartitionRunRecord>>;

    // ===== History =====

    /// Loads the result set saved under `key`
    ///
    /// # Returns
    ///
    /// * `Ok(ResultSet)` - Stored records ordered descending by rank
    /// * `Err(StorageError::HistoryNotFound)` - Nothing was ever saved under `key`
    fn load_history<T>(&self, key: &str) -> StorageResult<ResultSet<T>>
    where
        T: Record + DeserializeOwned;

    /// Saves a result set under `key`
    ///
    /// With `append` the records are added to the stored set (an identity
    /// already stored is updated in place); otherwise the stored set is
    /// replaced. Returns the number of records written.
    fn save_result<T>(&mut self, key: &str, result: &ResultSet<T>, append: bool) -> StorageResult<usize>
    where
        T: Record + Serialize;

    /// Removes every stored result set
    fn clear_history(&mut self) -> StorageResult<u64>;

    /// Lists history keys in key order
    fn history_keys(&self) -> StorageResult<Vec<String>>;

    /// Gets the top `limit` stored rows of a key without decoding payloads
    fn top_results(&self, key: &str, limit: usize) -> StorageResult<Vec<StoredResult>>;

    // ===== Statistics =====

    /// Counts runs
    fn count_runs(&self) -> StorageResult<u64>;

    /// Counts runs with a given status
    fn count_runs_by_status(&self, status: RunStatus) -> StorageResult<u64>;

    /// Counts stored results, optionally under one key only
    fn count_results(&self, key: Option<&str>) -> StorageResult<u64>;

    /// Sums lost pages across all recorded partitions
    fn count_lost_pages(&self) -> StorageResult<u64>;
}
