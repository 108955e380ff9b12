//! Statistics generation from the sweep database
//!
//! This module provides functionality for extracting and displaying
//! sweep statistics from the storage layer.

use crate::storage::{RunStatus, Storage};
use crate::SweepError;

/// Sweep statistics summary
#[derive(Debug, Clone, Default)]
pub struct SweepStatistics {
    /// Total number of runs recorded
    pub total_runs: u64,

    /// Count of runs by status
    pub runs_by_status: Vec<(RunStatus, u64)>,

    /// Stored result count per history key
    pub results_by_key: Vec<(String, u64)>,

    /// Pages lost across all recorded partitions
    pub lost_pages: u64,
}

impl SweepStatistics {
    pub fn stored_results(&self) -> u64 {
        self.results_by_key.iter().map(|(_, count)| count).sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(SweepStatistics)` - Successfully loaded statistics
/// * `Err(SweepError)` - Failed to query statistics
pub fn load_statistics<S: Storage>(storage: &S) -> Result<SweepStatistics, SweepError> {
    let total_runs = storage.count_runs()?;

    let mut runs_by_status = Vec::new();
    for status in [
        RunStatus::Completed,
        RunStatus::Interrupted,
        RunStatus::Failed,
        RunStatus::Running,
    ] {
        let count = storage.count_runs_by_status(status)?;
        if count > 0 {
            runs_by_status.push((status, count));
        }
    }

    let mut results_by_key = Vec::new();
    for key in storage.history_keys()? {
        let count = storage.count_results(Some(&key))?;
        results_by_key.push((key, count));
    }

    let lost_pages = storage.count_lost_pages()?;

    Ok(SweepStatistics {
        total_runs,
        runs_by_status,
        results_by_key,
        lost_pages,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &SweepStatistics) {
    println!("=== Sweep Statistics ===\n");

    println!("Runs: {}", stats.total_runs);
    for (status, count) in &stats.runs_by_status {
        println!("  {}: {}", status.to_db_string(), count);
    }
    println!();

    println!("Stored results: {}", stats.stored_results());
    for (key, count) in &stats.results_by_key {
        println!("  {}: {}", key, count);
    }
    println!();

    println!("Lost pages (all runs): {}", stats.lost_pages);
}
