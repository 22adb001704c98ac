//! Queue row types: one `QueueEntry` per library item, one `ArtItemEntry`
//! per artwork slot under review.

use super::artwork::{ArtType, MediaType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Queue entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Completed,
    Skipped,
    Cancelled,
    Error,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Completed => "completed",
            QueueStatus::Skipped => "skipped",
            QueueStatus::Cancelled => "cancelled",
            QueueStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, QueueStatus::Pending)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "completed" => Ok(QueueStatus::Completed),
            "skipped" => Ok(QueueStatus::Skipped),
            "cancelled" => Ok(QueueStatus::Cancelled),
            "error" => Ok(QueueStatus::Error),
            other => Err(format!("unknown queue status: {}", other)),
        }
    }
}

/// Art item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtItemStatus {
    Pending,
    Completed,
    Skipped,
    /// The library changed since scan time; never applied
    Stale,
    Error,
}

impl ArtItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtItemStatus::Pending => "pending",
            ArtItemStatus::Completed => "completed",
            ArtItemStatus::Skipped => "skipped",
            ArtItemStatus::Stale => "stale",
            ArtItemStatus::Error => "error",
        }
    }
}

impl fmt::Display for ArtItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ArtItemStatus::Pending),
            "completed" => Ok(ArtItemStatus::Completed),
            "skipped" => Ok(ArtItemStatus::Skipped),
            "stale" => Ok(ArtItemStatus::Stale),
            "error" => Ok(ArtItemStatus::Error),
            other => Err(format!("unknown art item status: {}", other)),
        }
    }
}

/// Why an art item was queued.
///
/// `Missing` means the slot was empty at scan time. `Candidate` means the
/// slot was filled but a materially better asset was detected; candidates
/// always require a human decision and are never auto-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewMode {
    Missing,
    Candidate,
}

impl ReviewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewMode::Missing => "missing",
            ReviewMode::Candidate => "candidate",
        }
    }
}

impl fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing" => Ok(ReviewMode::Missing),
            "candidate" => Ok(ReviewMode::Candidate),
            other => Err(format!("unknown review mode: {}", other)),
        }
    }
}

/// Top-level queue record representing a library item awaiting review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    /// Stable external guid, survives re-queues
    pub guid: String,
    pub media_type: MediaType,
    /// Library database id
    pub library_id: i64,
    pub title: String,
    pub year: String,
    pub status: QueueStatus,
    /// Scope tag recorded at scan time ("movies", "tvshows", ...)
    pub scope: String,
    pub scan_session_id: Option<i64>,
    pub date_processed: Option<DateTime<Utc>>,
}

/// Single artwork slot queued for review or processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtItemEntry {
    pub id: i64,
    pub queue_id: i64,
    pub art_type: ArtType,
    /// Artwork URL observed in the library at scan time; empty when the slot
    /// was missing
    pub baseline_url: String,
    /// Mirror of baseline, kept for display
    pub current_url: String,
    /// Outcome URL once resolved
    pub selected_url: Option<String>,
    pub review_mode: ReviewMode,
    pub requires_manual: bool,
    pub status: ArtItemStatus,
}

/// One art slot request inside an [`EnqueueSpec`].
#[derive(Debug, Clone)]
pub struct ArtRequest {
    pub art_type: ArtType,
    pub baseline_url: String,
    pub review_mode: ReviewMode,
    pub requires_manual: bool,
}

impl ArtRequest {
    pub fn missing(art_type: ArtType) -> Self {
        Self {
            art_type,
            baseline_url: String::new(),
            review_mode: ReviewMode::Missing,
            requires_manual: false,
        }
    }

    pub fn candidate(art_type: ArtType, baseline_url: impl Into<String>) -> Self {
        Self {
            art_type,
            baseline_url: baseline_url.into(),
            review_mode: ReviewMode::Candidate,
            requires_manual: true,
        }
    }
}

/// Specification for enqueueing one library item with its art slots.
#[derive(Debug, Clone)]
pub struct EnqueueSpec {
    pub media_type: MediaType,
    pub library_id: i64,
    pub title: String,
    pub year: String,
    pub priority: i64,
    pub scope: String,
    pub scan_session_id: Option<i64>,
    pub art_requests: Vec<ArtRequest>,
}

impl EnqueueSpec {
    pub fn new(media_type: MediaType, library_id: i64, title: impl Into<String>) -> Self {
        Self {
            media_type,
            library_id,
            title: title.into(),
            year: String::new(),
            priority: 5,
            scope: String::new(),
            scan_session_id: None,
            art_requests: Vec::new(),
        }
    }
}
