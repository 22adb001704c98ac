//! Unattended queue processor.
//!
//! Fills missing artwork slots with the top-ranked candidate that survives
//! the language policy. Hard rules: candidate-mode items are never touched
//! (an upgrade always needs a human decision), and a slot with any live
//! value is never overwritten.

use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use artfetch_common::events::{ArtEvent, EventBus};
use artfetch_common::Result;

use super::ranking::{filter_for_auto_apply, LanguagePolicy};
use super::source_fetcher::CandidateSource;
use crate::db::{queue, sessions};
use crate::library::MediaLibrary;
use crate::models::{
    ArtItemStatus, AutoRunReport, MediaType, QueueEntry, QueueStatus, ReviewDetail, ReviewMode,
    SessionStats,
};

const BATCH_SIZE: i64 = 100;

/// Why an entry was not (fully) auto-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    NoOptions,
    PolicyBlocked,
    NeedsManual,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoOptions => "no_artwork_available",
            SkipReason::PolicyBlocked => "language_policy_blocked",
            SkipReason::NeedsManual => "needs_manual_review",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    pub session_id: Option<i64>,
    pub processed: u64,
    pub auto_applied: u64,
    pub skipped: u64,
    pub errors: u64,
    pub pending_after: u64,
}

pub struct Processor {
    db: SqlitePool,
    library: Arc<dyn MediaLibrary>,
    source: Arc<dyn CandidateSource>,
    events: EventBus,
    policy: LanguagePolicy,
}

impl Processor {
    pub fn new(
        db: SqlitePool,
        library: Arc<dyn MediaLibrary>,
        source: Arc<dyn CandidateSource>,
        events: EventBus,
        policy: LanguagePolicy,
    ) -> Self {
        Self {
            db,
            library,
            source,
            events,
            policy,
        }
    }

    /// Drain pending queue entries, applying missing artwork automatically.
    ///
    /// The end-of-run report is appended to `session_id` when given,
    /// otherwise to a fresh `auto_fetch` session.
    pub async fn process(
        &self,
        media_filter: Option<Vec<MediaType>>,
        session_id: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<ProcessReport> {
        let filter = media_filter.as_deref();
        let total = queue::count_queue_items(&self.db, Some(QueueStatus::Pending), filter).await?;
        tracing::info!(total, "Processing artwork queue");

        let mut report = ProcessReport::default();
        let mut applied_details: Vec<ReviewDetail> = Vec::new();
        let mut skipped_details: Vec<ReviewDetail> = Vec::new();
        // Entries holding only candidate-mode work are left untouched; track
        // them so the drain loop doesn't spin on them.
        let mut seen: HashSet<i64> = HashSet::new();
        let mut cancelled = false;

        'outer: loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let batch =
                queue::next_batch(&self.db, BATCH_SIZE, QueueStatus::Pending, filter).await?;
            let fresh: Vec<QueueEntry> = batch
                .into_iter()
                .filter(|entry| !seen.contains(&entry.id))
                .collect();
            if fresh.is_empty() {
                break;
            }

            for entry in fresh {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'outer;
                }

                seen.insert(entry.id);
                self.process_item(&entry, &mut report, &mut applied_details, &mut skipped_details)
                    .await;
            }
        }

        report.pending_after =
            queue::count_queue_items(&self.db, Some(QueueStatus::Pending), filter).await?;

        // Entries that still hold pending art items (candidates awaiting a
        // human) go back to pending for the reviewer.
        queue::restore_pending_items(&self.db, filter).await?;

        let run = AutoRunReport {
            timestamp: chrono::Utc::now(),
            processed: report.processed,
            auto_applied: report.auto_applied,
            skipped: report.skipped,
            errors: report.errors,
            pending_after: report.pending_after,
            applied: applied_details,
            skipped_items: skipped_details,
        };
        report.session_id = Some(self.record_run(session_id, media_filter, run).await?);

        self.events.emit_lossy(ArtEvent::ProcessRunCompleted {
            session_id: report.session_id.unwrap_or_default(),
            processed: report.processed,
            auto_applied: report.auto_applied,
            skipped: report.skipped,
            errors: report.errors,
            timestamp: chrono::Utc::now(),
        });

        tracing::info!(
            processed = report.processed,
            auto_applied = report.auto_applied,
            skipped = report.skipped,
            errors = report.errors,
            cancelled,
            "Processor run finished"
        );

        Ok(report)
    }

    async fn process_item(
        &self,
        entry: &QueueEntry,
        report: &mut ProcessReport,
        applied_details: &mut Vec<ReviewDetail>,
        skipped_details: &mut Vec<ReviewDetail>,
    ) {
        match self.try_process_item(entry, applied_details).await {
            Ok(ItemOutcome::Applied) => {
                report.processed += 1;
                report.auto_applied += 1;
            }
            Ok(ItemOutcome::Untouched) => {
                // Candidate-only entry: not this component's job.
            }
            Ok(ItemOutcome::Skipped(reason)) => {
                report.processed += 1;
                report.skipped += 1;
                skipped_details.push(ReviewDetail {
                    title: entry.title.clone(),
                    art_type: None,
                    media_type: entry.media_type,
                    library_id: entry.library_id,
                    url: None,
                    source: None,
                    reason: Some(reason.as_str().to_string()),
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => {
                tracing::error!(title = %entry.title, "Error processing item: {}", e);
                report.processed += 1;
                report.errors += 1;
                let _ = queue::set_queue_status(&self.db, entry.id, QueueStatus::Error).await;
            }
        }
    }

    async fn try_process_item(
        &self,
        entry: &QueueEntry,
        applied_details: &mut Vec<ReviewDetail>,
    ) -> Result<ItemOutcome> {
        let art_items = queue::art_items_for(&self.db, &[entry.id])
            .await?
            .remove(&entry.id)
            .unwrap_or_default();

        let pending: Vec<_> = art_items
            .into_iter()
            .filter(|item| item.status == ArtItemStatus::Pending)
            .collect();

        // Candidates always require a human decision; an entry carrying only
        // candidate work is left exactly as it is.
        if !pending.is_empty()
            && pending
                .iter()
                .all(|item| item.review_mode == ReviewMode::Candidate)
        {
            return Ok(ItemOutcome::Untouched);
        }

        let live_art = self
            .library
            .item_art(entry.media_type, entry.library_id)
            .await
            .map_err(|e| artfetch_common::Error::Internal(e.to_string()))?;

        let all_art = self
            .source
            .fetch_all(entry.media_type, entry.library_id, false)
            .await?;

        let mut applied_any = false;
        let mut no_options = false;
        let mut policy_blocked = false;
        let mut has_candidates = false;

        for item in &pending {
            if item.review_mode != ReviewMode::Missing {
                has_candidates = true;
                continue;
            }

            // Never overwrite: any live value means this slot is not ours.
            let live_url = live_art.get(&item.art_type).cloned().unwrap_or_default();
            if !live_url.is_empty() {
                queue::set_art_item_status(&self.db, item.id, ArtItemStatus::Stale).await?;
                continue;
            }

            let available = all_art
                .get(&item.art_type)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            if available.is_empty() {
                no_options = true;
                continue;
            }

            let filtered = filter_for_auto_apply(available, item.art_type, &self.policy);
            let Some(best) = filtered.first() else {
                policy_blocked = true;
                continue;
            };

            let mut updates = HashMap::new();
            updates.insert(item.art_type.as_str().to_string(), best.url.clone());
            self.library
                .set_item_art(entry.media_type, entry.library_id, &updates)
                .await
                .map_err(|e| artfetch_common::Error::Internal(e.to_string()))?;

            queue::mark_art_item_selected(&self.db, item.id, &best.url, true).await?;
            applied_any = true;

            tracing::info!(
                title = %entry.title,
                art_type = %item.art_type,
                url = %best.url,
                "Auto-applied artwork"
            );
            applied_details.push(ReviewDetail {
                title: entry.title.clone(),
                art_type: Some(item.art_type),
                media_type: entry.media_type,
                library_id: entry.library_id,
                url: Some(best.url.clone()),
                source: Some(best.source.clone()),
                reason: None,
                timestamp: chrono::Utc::now(),
            });
            self.events.emit_lossy(ArtEvent::ArtworkApplied {
                title: entry.title.clone(),
                art_type: item.art_type.as_str().to_string(),
                url: best.url.clone(),
                auto_applied: true,
                timestamp: chrono::Utc::now(),
            });
        }

        if applied_any {
            queue::set_queue_status(&self.db, entry.id, QueueStatus::Completed).await?;
            return Ok(ItemOutcome::Applied);
        }

        queue::set_queue_status(&self.db, entry.id, QueueStatus::Skipped).await?;
        let reason = if no_options {
            SkipReason::NoOptions
        } else if policy_blocked {
            SkipReason::PolicyBlocked
        } else if has_candidates {
            SkipReason::NeedsManual
        } else {
            SkipReason::NoOptions
        };
        Ok(ItemOutcome::Skipped(reason))
    }

    /// Append the run report to the owning session's stats blob.
    async fn record_run(
        &self,
        session_id: Option<i64>,
        media_filter: Option<Vec<MediaType>>,
        run: AutoRunReport,
    ) -> Result<i64> {
        let session_id = match session_id {
            Some(id) => id,
            None => {
                let media_types = media_filter.unwrap_or_default();
                sessions::create_session(&self.db, "auto_fetch", &media_types, &[]).await?
            }
        };

        let mut stats = sessions::get_session(&self.db, session_id)
            .await?
            .map(|session| session.stats)
            .unwrap_or_else(SessionStats::default);
        stats.auto_runs.push(run);
        sessions::update_stats(&self.db, session_id, &stats).await?;

        Ok(session_id)
    }
}

enum ItemOutcome {
    Applied,
    Untouched,
    Skipped(SkipReason),
}
