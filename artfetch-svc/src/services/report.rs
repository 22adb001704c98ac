//! Human-readable session reports.
//!
//! Format is cosmetic; the counts come straight from the session stats
//! blob.

use crate::models::{ReviewDetail, ScanSession, SessionStatus};

const MAX_SECTION_ITEMS: usize = 20;

fn shorten(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        value.to_string()
    } else {
        format!("{}...", &value[..max_len.saturating_sub(3)])
    }
}

fn format_detail(entry: &ReviewDetail) -> String {
    let mut parts = Vec::new();
    match entry.art_type {
        Some(art_type) => parts.push(format!("{} - {}", entry.title, art_type)),
        None => parts.push(entry.title.clone()),
    }
    if let Some(source) = &entry.source {
        parts.push(format!("[{}]", source));
    }
    if let Some(url) = &entry.url {
        parts.push(shorten(url, 70));
    }
    if let Some(reason) = &entry.reason {
        parts.push(format!("({})", reason));
    }
    parts.join(" ")
}

fn append_section(lines: &mut Vec<String>, header: &str, entries: &[ReviewDetail], indent: &str) {
    if entries.is_empty() {
        return;
    }
    lines.push(header.to_string());
    for entry in entries.iter().take(MAX_SECTION_ITEMS) {
        lines.push(format!("{}* {}", indent, format_detail(entry)));
    }
    if entries.len() > MAX_SECTION_ITEMS {
        lines.push(format!(
            "{}... {} more",
            indent,
            entries.len() - MAX_SECTION_ITEMS
        ));
    }
    lines.push(String::new());
}

/// Render the report for one session.
pub fn render_session_report(session: &ScanSession, pending_missing: u64) -> String {
    let stats = &session.stats;
    let mut lines: Vec<String> = Vec::new();

    lines.push("=".repeat(50));
    lines.push("ARTWORK REVIEW SESSION REPORT".to_string());
    lines.push("=".repeat(50));
    lines.push(String::new());
    lines.push(format!("Status: {}", session.status.as_str().to_uppercase()));
    lines.push(format!("Started: {}", session.started.to_rfc3339()));
    lines.push(format!(
        "Last Activity: {}",
        session.last_activity.to_rfc3339()
    ));
    if session.status == SessionStatus::Completed {
        if let Some(completed) = session.completed {
            lines.push(format!("Completed: {}", completed.to_rfc3339()));
        }
    }

    let art_types = if session.art_types.is_empty() {
        "all".to_string()
    } else {
        session
            .art_types
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    lines.push(format!("Art Types: {}", art_types));
    lines.push(String::new());

    lines.push("Statistics:".to_string());
    if stats.scanned > 0 || stats.queued > 0 {
        lines.push(format!("  Scanned: {}", stats.scanned));
        lines.push(format!("  Queued: {}", stats.queued));
    }
    lines.push(format!("  Manual Reviewed: {}", stats.applied + stats.skipped));
    lines.push(format!("    Applied: {}", stats.applied));
    lines.push(format!("    Skipped: {}", stats.skipped));
    lines.push(format!("  Auto-Skipped: {}", stats.auto));
    if pending_missing > 0 {
        lines.push(format!(
            "  Remaining Pending: {} ({} missing artwork)",
            stats.remaining, pending_missing
        ));
    } else {
        lines.push(format!("  Remaining Pending: {}", stats.remaining));
    }
    lines.push(String::new());

    append_section(
        &mut lines,
        "Manual Applied:",
        &stats.details.manual_applied,
        "    ",
    );
    append_section(
        &mut lines,
        "Manual Skipped:",
        &stats.details.manual_skipped,
        "    ",
    );
    append_section(
        &mut lines,
        "Auto-Skipped During Review:",
        &stats.details.manual_auto,
        "    ",
    );
    append_section(
        &mut lines,
        "Stale Items (baseline changed during review):",
        &stats.details.stale,
        "    ",
    );

    if !stats.auto_runs.is_empty() {
        lines.push("Auto Fetch Runs:".to_string());
        for (index, run) in stats.auto_runs.iter().enumerate() {
            lines.push(format!(
                "  Run #{} ({})",
                index + 1,
                run.timestamp.to_rfc3339()
            ));
            lines.push(format!(
                "    Processed: {} | Applied: {} | Skipped: {} | Errors: {}",
                run.processed, run.auto_applied, run.skipped, run.errors
            ));
            lines.push(format!("    Remaining after run: {}", run.pending_after));
            append_section(&mut lines, "    Applied:", &run.applied, "      ");
            append_section(&mut lines, "    Skipped:", &run.skipped_items, "      ");
        }
        lines.push(String::new());
    }

    lines.push("=".repeat(50));
    lines.join("\n")
}
