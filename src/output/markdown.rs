//! Markdown report generation
//!
//! This module renders the stored result sets as markdown, one ranked table
//! per history key.

use crate::output::traits::{OutputResult, ResultsReport};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a results report as markdown
///
/// # Arguments
///
/// * `report` - The report data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn generate_markdown_report(report: &ResultsReport, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(report);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a results report as markdown
pub fn format_markdown_report(report: &ResultsReport) -> String {
    let mut md = String::new();

    md.push_str("# Smart-Sweep Results\n\n");

    md.push_str("## Latest Run\n\n");
    match report.run_id {
        Some(run_id) => {
            md.push_str(&format!("- **Run ID**: {}\n", run_id));
            if let Some(started) = &report.started_at {
                md.push_str(&format!("- **Started**: {}\n", started));
            }
            if let Some(finished) = &report.finished_at {
                md.push_str(&format!("- **Finished**: {}\n", finished));
            }
            if let Some(status) = &report.status {
                md.push_str(&format!("- **Status**: {}\n", status));
            }
            if let Some(hash) = &report.config_hash {
                md.push_str(&format!("- **Config Hash**: {}\n", hash));
            }
        }
        None => md.push_str("No runs recorded.\n"),
    }
    md.push('\n');

    md.push_str("## Overview\n\n");
    md.push_str("| History Key | Stored |\n");
    md.push_str("|-------------|--------|\n");
    for section in &report.sections {
        md.push_str(&format!("| {} | {} |\n", section.history_key, section.stored));
    }
    md.push_str(&format!("| **Total** | **{}** |\n\n", report.total_stored()));

    for section in &report.sections {
        md.push_str(&format!("## {}\n\n", section.history_key));
        if section.rows.is_empty() {
            md.push_str("No stored results.\n\n");
            continue;
        }

        if (section.rows.len() as u64) < section.stored {
            md.push_str(&format!(
                "Top {} of {} by rank.\n\n",
                section.rows.len(),
                section.stored
            ));
        }

        md.push_str("| # | Identity | Rank | Tags | Label | Saved |\n");
        md.push_str("|---|----------|------|------|-------|-------|\n");
        for (position, row) in section.rows.iter().enumerate() {
            md.push_str(&format!(
                "| {} | `{}` | {:.4} | {} | {} | {} |\n",
                position + 1,
                row.identity,
                row.rank,
                row.tags.join(", "),
                row.label.as_deref().unwrap_or(""),
                row.saved_at
            ));
        }
        md.push('\n');
    }

    md
}
