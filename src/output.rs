//! CLI output formatting for pipeline runs.
//!
//! # Information-First Display
//!
//! Output is **pack-centric, not file-centric**. Every entry leads with its
//! positional index and identity (pack title or slug); artifact states and
//! reasons follow as indented context lines. Files on disk are implied by
//! the slug, so paths are never repeated.
//!
//! # Output Format
//!
//! ```text
//! Pack building: completed (12 entries, 1 packs synced, 4 skipped, 0 failed)
//! 001 FastAPI Backend Pack #1 (5 items)
//!     Slug: fastapi-backend-pack-1
//!     Manifest: created
//!     Product page: unchanged
//! 002 python-data
//!     Skipped: 3 of 5 required items
//!
//! Archive building: completed (1 archives built, 0 skipped, 0 failed)
//! 001 fastapi-backend-pack-1 (5 articles)
//!     Archive: created
//!
//! QA: completed (1 packs checked, 0 with issues, 2 unpacked posts, 0 heading warnings)
//! 001 FastAPI Backend Pack #1
//!     OK
//!
//! Run finished: 7 stages, 0 failed
//! ```
//!
//! # Architecture
//!
//! Each report kind has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::archive::{ArchiveOutcome, ArchiveReport};
use crate::orchestrate::{ItemOutcome, RunSummary, StageReport};
use crate::qa::PackCheck;
use crate::sync::SyncReport;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Index + name, with an optional counted detail.
///
/// ```text
/// 001 FastAPI Backend Pack #1 (5 items)
/// 002 python-data
/// ```
fn entity_header(index: usize, name: &str, count: Option<(usize, &str)>) -> String {
    match count {
        Some((n, noun)) => format!("{} {} ({} {})", format_index(index), name, n, noun),
        None => format!("{} {}", format_index(index), name),
    }
}

fn context_line(label: &str, value: impl std::fmt::Display) -> String {
    format!("{}{}: {}", indent(1), label, value)
}

// ============================================================================
// Per-item formatting
// ============================================================================

pub fn format_sync_report(index: usize, report: &SyncReport) -> Vec<String> {
    vec![
        entity_header(index, &report.title, Some((report.items, "items"))),
        context_line("Slug", &report.pack),
        context_line("Manifest", report.manifest),
        context_line("Product page", report.product_page),
    ]
}

pub fn format_archive_report(index: usize, report: &ArchiveReport) -> Vec<String> {
    match &report.outcome {
        ArchiveOutcome::Written {
            status,
            articles,
            missing,
            duplicates,
        } => {
            let mut lines = vec![
                entity_header(index, &report.pack, Some((*articles, "articles"))),
                context_line("Archive", status),
            ];
            if !missing.is_empty() {
                lines.push(context_line("Missing", missing.join(", ")));
            }
            if !duplicates.is_empty() {
                lines.push(context_line("Duplicate", duplicates.join(", ")));
            }
            lines
        }
        ArchiveOutcome::Skipped { reason } => vec![
            entity_header(index, &report.pack, None),
            context_line("Skipped", reason),
        ],
    }
}

pub fn format_pack_check(index: usize, check: &PackCheck) -> Vec<String> {
    let mut lines = vec![entity_header(index, &check.title, None)];
    if check.issues.is_empty() {
        lines.push(format!("{}OK", indent(1)));
    }
    lines.extend(check.issues.iter().map(|issue| context_line("Issue", issue)));
    lines
}

fn format_item(index: usize, item: &ItemOutcome) -> Vec<String> {
    match item {
        ItemOutcome::Synced(report) => format_sync_report(index, report),
        ItemOutcome::Archived(report) => format_archive_report(index, report),
        ItemOutcome::Checked(check) => format_pack_check(index, check),
        ItemOutcome::Rejected(rejected) => vec![
            entity_header(index, &rejected.record, None),
            context_line("Rejected", &rejected.reason),
        ],
        ItemOutcome::Skipped { name, reason } => {
            vec![entity_header(index, name, None), context_line("Skipped", reason)]
        }
        ItemOutcome::Failed { name, error } => {
            vec![entity_header(index, name, None), context_line("Failed", error)]
        }
    }
}

// ============================================================================
// Stage and run formatting
// ============================================================================

/// Stage headline followed by its items.
pub fn format_stage_report(report: &StageReport) -> Vec<String> {
    let mut lines = vec![format!("{}: {}", report.stage, report.outcome)];
    for (i, item) in report.items.iter().enumerate() {
        lines.extend(format_item(i + 1, item));
    }
    lines
}

/// Every stage separated by a blank line, closed by a one-line tally.
pub fn format_run_summary(summary: &RunSummary) -> Vec<String> {
    let mut lines = Vec::new();
    for report in &summary.reports {
        lines.extend(format_stage_report(report));
        lines.push(String::new());
    }
    lines.push(format!(
        "Run finished: {} stages, {} failed",
        summary.reports.len(),
        summary.failed_stages().len()
    ));
    lines
}

pub fn print_run_summary(summary: &RunSummary) {
    for line in format_run_summary(summary) {
        println!("{}", line);
    }
}
