//! Output error and report types
//!
//! This module defines the error type of the output layer and the data
//! structures a results report is rendered from.

use crate::storage::StoredResult;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// One row of a results table, decoded from a stored payload
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub identity: String,
    pub rank: f64,
    pub tags: Vec<String>,
    pub label: Option<String>,
    pub saved_at: String,
}

impl ReportRow {
    /// Builds a row, reading tags and label from the payload when present
    pub fn from_stored(stored: &StoredResult) -> Self {
        let payload: Value = serde_json::from_str(&stored.payload).unwrap_or(Value::Null);

        let tags = payload
            .get("tags")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let label = payload
            .get("label")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            identity: stored.identity.clone(),
            rank: stored.rank,
            tags,
            label,
            saved_at: stored.saved_at.clone(),
        }
    }
}

/// The stored result set of one history key
#[derive(Debug, Clone, Default)]
pub struct HistorySection {
    pub history_key: String,

    /// Records stored under the key
    pub stored: u64,

    /// Top rows by rank
    pub rows: Vec<ReportRow>,
}

/// Everything a results report shows
#[derive(Debug, Clone, Default)]
pub struct ResultsReport {
    // Latest run metadata
    pub run_id: Option<i64>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub status: Option<String>,
    pub config_hash: Option<String>,

    pub sections: Vec<HistorySection>,
}

impl ResultsReport {
    pub fn total_stored(&self) -> u64 {
        self.sections.iter().map(|s| s.stored).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_row_from_payload() {
        let stored = StoredResult {
            identity: "0xabc".to_string(),
            rank: 0.75,
            payload: r#"{"address":"0xabc","rank":0.75,"tags":["smart_money"],"label":"whale"}"#
                .to_string(),
            saved_at: "2024-01-01T00:00:00Z".to_string(),
        };

        let row = ReportRow::from_stored(&stored);
        assert_eq!(row.tags, vec!["smart_money".to_string()]);
        assert_eq!(row.label.as_deref(), Some("whale"));
    }

    #[test]
    fn test_report_row_with_unreadable_payload() {
        let stored = StoredResult {
            identity: "0xabc".to_string(),
            rank: 0.1,
            payload: "not json".to_string(),
            saved_at: "2024-01-01T00:00:00Z".to_string(),
        };

        let row = ReportRow::from_stored(&stored);
        assert!(row.tags.is_empty());
        assert_eq!(row.label, None);
    }
}
