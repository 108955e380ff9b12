//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Smart-Sweep database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track sweep runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per partition collected in a run
CREATE TABLE IF NOT EXISTS partition_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    history_key TEXT NOT NULL,
    total INTEGER NOT NULL,
    total_pages INTEGER NOT NULL,
    pages_fetched INTEGER NOT NULL,
    lost_pages INTEGER NOT NULL,
    lost_scopes INTEGER NOT NULL,
    records_received INTEGER NOT NULL,
    unique_records INTEGER NOT NULL,
    new_records INTEGER NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_partition_runs_run ON partition_runs(run_id);

-- Stored result sets, one row per identity per history key
CREATE TABLE IF NOT EXISTS results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    history_key TEXT NOT NULL,
    identity TEXT NOT NULL,
    rank REAL NOT NULL,
    payload TEXT NOT NULL,
    saved_at TEXT NOT NULL,
    UNIQUE(history_key, identity)
);

CREATE INDEX IF NOT EXISTS idx_results_key ON results(history_key);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
