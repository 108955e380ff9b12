//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::model::{DuplicatePolicy, Record, ResultSet};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{PartitionRunRecord, RunRecord, RunStatus, StoredResult};
use crate::SweepError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(SweepError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, SweepError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, SweepError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn record_partition_run(&mut self, record: &PartitionRunRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO partition_runs (run_id, history_key, total, total_pages, pages_fetched,
             lost_pages, lost_scopes, records_received, unique_records, new_records, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.run_id,
                record.history_key,
                record.total as i64,
                record.total_pages,
                record.pages_fetched,
                record.lost_pages,
                record.lost_scopes,
                record.records_received as i64,
                record.unique_records as i64,
                record.new_records as i64,
                now
            ],
        )?;
        Ok(())
    }

    fn get_partition_runs(&self, run_id: i64) -> StorageResult<Vec<PartitionRunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, history_key, total, total_pages, pages_fetched, lost_pages, lost_scopes,
             records_received, unique_records, new_records
             FROM partition_runs WHERE run_id = ?1 ORDER BY id",
        )?;

        let records = stmt
            .query_map(params![run_id], |row| {
                Ok(PartitionRunRecord {
                    run_id: row.get(0)?,
                    history_key: row.get(1)?,
                    total: row.get::<_, i64>(2)? as u64,
                    total_pages: row.get(3)?,
                    pages_fetched: row.get(4)?,
                    lost_pages: row.get(5)?,
                    lost_scopes: row.get(6)?,
                    records_received: row.get::<_, i64>(7)? as u64,
                    unique_records: row.get::<_, i64>(8)? as u64,
                    new_records: row.get::<_, i64>(9)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // ===== History =====

    fn load_history<T>(&self, key: &str) -> StorageResult<ResultSet<T>>
    where
        T: Record + DeserializeOwned,
    {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM results WHERE history_key = ?1 ORDER BY rank DESC, id ASC",
        )?;

        let payloads = stmt
            .query_map(params![key], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        if payloads.is_empty() {
            return Err(StorageError::HistoryNotFound(key.to_string()));
        }

        let records = payloads
            .iter()
            .map(|payload| serde_json::from_str::<T>(payload))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Serialization(format!("history '{}': {}", key, e)))?;

        Ok(ResultSet::from_records(records, DuplicatePolicy::FirstSeen))
    }

    fn save_result<T>(&mut self, key: &str, result: &ResultSet<T>, append: bool) -> StorageResult<usize>
    where
        T: Record + Serialize,
    {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        if !append {
            tx.execute("DELETE FROM results WHERE history_key = ?1", params![key])?;
        }

        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO results (history_key, identity, rank, payload, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(history_key, identity) DO UPDATE SET
                 rank = excluded.rank, payload = excluded.payload, saved_at = excluded.saved_at",
            )?;

            for record in result {
                let payload = serde_json::to_string(record)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                let rank = if record.rank().is_finite() {
                    record.rank()
                } else {
                    0.0
                };
                written += stmt.execute(params![key, record.identity(), rank, payload, now])?;
            }
        }

        tx.commit()?;
        Ok(written)
    }

    fn clear_history(&mut self) -> StorageResult<u64> {
        let removed = self.conn.execute("DELETE FROM results", [])?;
        Ok(removed as u64)
    }

    fn history_keys(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT history_key FROM results ORDER BY history_key")?;

        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(keys)
    }

    fn top_results(&self, key: &str, limit: usize) -> StorageResult<Vec<StoredResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT identity, rank, payload, saved_at FROM results
             WHERE history_key = ?1 ORDER BY rank DESC, id ASC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![key, limit as i64], |row| {
                Ok(StoredResult {
                    identity: row.get(0)?,
                    rank: row.get(1)?,
                    payload: row.get(2)?,
                    saved_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    // ===== Statistics =====

    fn count_runs(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_runs_by_status(&self, status: RunStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_results(&self, key: Option<&str>) -> StorageResult<u64> {
        let count: i64 = match key {
            Some(key) => self.conn.query_row(
                "SELECT COUNT(*) FROM results WHERE history_key = ?1",
                params![key],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM results", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    fn count_lost_pages(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(lost_pages), 0) FROM partition_runs",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
