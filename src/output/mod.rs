//! Output module for sweep reports and statistics
//!
//! This module handles:
//! - Printing the outcome of a sweep
//! - Generating markdown reports of stored results
//! - Loading and printing database statistics

mod markdown;
pub mod stats;
mod traits;

pub use markdown::{format_markdown_report, generate_markdown_report};
pub use stats::{load_statistics, print_statistics, SweepStatistics};
pub use traits::{HistorySection, OutputError, OutputResult, ReportRow, ResultsReport};

use crate::collector::{PartitionOutcome, SweepReport};
use crate::storage::Storage;
use crate::SweepError;

/// Builds a results report from storage
///
/// # Arguments
///
/// * `storage` - The storage backend containing stored results
/// * `limit` - Maximum rows per history key
///
/// # Returns
///
/// * `Ok(ResultsReport)` - Successfully generated report
/// * `Err(SweepError)` - Failed to query storage
pub fn generate_report<S: Storage>(storage: &S, limit: usize) -> Result<ResultsReport, SweepError> {
    let run = storage.get_latest_run()?;

    let mut sections = Vec::new();
    for key in storage.history_keys()? {
        let stored = storage.count_results(Some(&key))?;
        let rows = storage
            .top_results(&key, limit)?
            .iter()
            .map(ReportRow::from_stored)
            .collect();
        sections.push(HistorySection {
            history_key: key,
            stored,
            rows,
        });
    }

    Ok(ResultsReport {
        run_id: run.as_ref().map(|r| r.id),
        started_at: run.as_ref().map(|r| r.started_at.clone()),
        finished_at: run.as_ref().and_then(|r| r.finished_at.clone()),
        status: run.as_ref().map(|r| r.status.to_db_string().to_string()),
        config_hash: run.map(|r| r.config_hash),
        sections,
    })
}

/// Prints the outcome of a sweep to stdout
pub fn print_sweep_report(report: &SweepReport) {
    println!("\n=== Sweep Run {} ===", report.run_id);
    println!("Status: {}", report.status.to_db_string());
    println!("Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    println!();

    for partition in &report.partitions {
        let key = partition.history_key();
        match &partition.outcome {
            PartitionOutcome::Collected {
                summary,
                new_records,
            } => {
                let new_records = new_records
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {}: {} unique ({} received), {}/{} page(s), {} new",
                    key,
                    summary.unique_records,
                    summary.records_received,
                    summary.pages_fetched,
                    summary.total_pages,
                    new_records
                );
                if summary.pages_beyond_cap > 0 {
                    println!(
                        "      {} page(s) beyond max-pages not collected",
                        summary.pages_beyond_cap
                    );
                }
                for lost in &summary.lost_pages {
                    println!("      lost page {}: {}", lost.page, lost.reason);
                }
                if !summary.lost_scopes.is_empty() {
                    println!(
                        "      lost scopes ({}): {}",
                        summary.lost_scopes.len(),
                        summary.lost_scopes.join(", ")
                    );
                }
            }
            PartitionOutcome::Skipped { reason } => println!("  {}: skipped ({})", key, reason),
            PartitionOutcome::Failed { error } => println!("  {}: FAILED: {}", key, error),
            PartitionOutcome::Cancelled => println!("  {}: cancelled", key),
        }
    }

    println!();
    println!(
        "New records: {}  Failed partitions: {}  Complete: {}",
        report.new_records(),
        report.failed_count(),
        if report.is_complete() { "yes" } else { "no" }
    );
}
