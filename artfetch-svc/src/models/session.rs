//! Scan session model and the serialized stats blob.
//!
//! A session is the durable record of one discovery-and-review episode.
//! Stats are stored as a JSON blob on the session row and persisted after
//! every reviewed item so a crash loses at most one item's progress.

use super::artwork::{ArtType, MediaType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Detail log entries are capped per category so the blob stays bounded.
pub const MAX_DETAIL_ENTRIES: usize = 100;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionStatus::Active),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// One structured event in the session detail log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDetail {
    pub title: String,
    pub art_type: Option<ArtType>,
    pub media_type: MediaType,
    pub library_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Structured per-item logs grouped by outcome category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewLog {
    #[serde(default)]
    pub manual_applied: Vec<ReviewDetail>,
    #[serde(default)]
    pub manual_skipped: Vec<ReviewDetail>,
    /// Auto-skipped during review because no options survived filtering
    #[serde(default)]
    pub manual_auto: Vec<ReviewDetail>,
    /// Baseline changed between scan and review
    #[serde(default)]
    pub stale: Vec<ReviewDetail>,
}

impl ReviewLog {
    fn push_capped(log: &mut Vec<ReviewDetail>, entry: ReviewDetail) {
        log.push(entry);
        if log.len() > MAX_DETAIL_ENTRIES {
            log.remove(0);
        }
    }

    pub fn record_applied(&mut self, entry: ReviewDetail) {
        Self::push_capped(&mut self.manual_applied, entry);
    }

    pub fn record_skipped(&mut self, entry: ReviewDetail) {
        Self::push_capped(&mut self.manual_skipped, entry);
    }

    pub fn record_auto(&mut self, entry: ReviewDetail) {
        Self::push_capped(&mut self.manual_auto, entry);
    }

    pub fn record_stale(&mut self, entry: ReviewDetail) {
        Self::push_capped(&mut self.stale, entry);
    }
}

/// Report of one unattended processor run, appended to the owning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRunReport {
    pub timestamp: DateTime<Utc>,
    pub processed: u64,
    pub auto_applied: u64,
    pub skipped: u64,
    pub errors: u64,
    pub pending_after: u64,
    #[serde(default)]
    pub applied: Vec<ReviewDetail>,
    #[serde(default)]
    pub skipped_items: Vec<ReviewDetail>,
}

/// Serialized session statistics blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Items inspected by the scanner
    #[serde(default)]
    pub scanned: u64,
    /// Items the scanner queued
    #[serde(default)]
    pub queued: u64,
    /// Art items applied during manual review
    #[serde(default)]
    pub applied: u64,
    /// Art items the reviewer skipped on user request
    #[serde(default)]
    pub skipped: u64,
    /// Items auto-skipped because no options were available
    #[serde(default)]
    pub auto: u64,
    /// Pending queue entries remaining at last save
    #[serde(default)]
    pub remaining: u64,
    #[serde(default)]
    pub details: ReviewLog,
    #[serde(default)]
    pub auto_runs: Vec<AutoRunReport>,
}

impl SessionStats {
    pub fn from_json(raw: Option<&str>) -> Self {
        raw.and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// One scan-and-review episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: i64,
    /// "missing_art" (scanner), "manual_review", "auto_fetch" or
    /// "texture_precache"
    pub scan_type: String,
    pub status: SessionStatus,
    pub media_types: Vec<MediaType>,
    pub art_types: Vec<ArtType>,
    pub stats: SessionStats,
    pub started: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub completed: Option<DateTime<Utc>>,
}
