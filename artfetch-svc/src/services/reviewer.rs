//! Interactive review workflow.
//!
//! Drains the queue in batches, re-validates every art item against live
//! library state (the scan-time snapshot may have gone stale), presents
//! choices through the chooser boundary and applies outcomes. Stats and the
//! detail log are persisted to the owning session after every item, so a
//! crash loses at most one item's progress.

use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use artfetch_common::events::{ArtEvent, EventBus};
use artfetch_common::Result;

use super::chooser::{ArtworkChooser, ChooserAction, ChooserRequest};
use super::ranking::{filter_for_review, LanguagePolicy};
use super::source_fetcher::CandidateSource;
use crate::db::{queue, sessions};
use crate::library::MediaLibrary;
use crate::models::{
    ArtItemEntry, ArtItemStatus, ArtType, MediaType, QueueEntry, QueueStatus, ReviewDetail,
    ReviewMode, SessionStats,
};

const BATCH_SIZE: i64 = 25;

#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub session_id: i64,
    pub cancelled: bool,
    pub remaining: u64,
    pub stats: SessionStats,
}

/// Per-item review result.
enum ItemResult {
    Applied,
    Skipped,
    /// Auto-skipped: nothing to offer after filtering
    Auto,
    /// User aborted the run
    Cancel,
}

pub struct Reviewer {
    db: SqlitePool,
    library: Arc<dyn MediaLibrary>,
    source: Arc<dyn CandidateSource>,
    chooser: Arc<dyn ArtworkChooser>,
    events: EventBus,
    policy: LanguagePolicy,
}

impl Reviewer {
    pub fn new(
        db: SqlitePool,
        library: Arc<dyn MediaLibrary>,
        source: Arc<dyn CandidateSource>,
        chooser: Arc<dyn ArtworkChooser>,
        events: EventBus,
        policy: LanguagePolicy,
    ) -> Self {
        Self {
            db,
            library,
            source,
            chooser,
            events,
            policy,
        }
    }

    /// Review pending queue items.
    ///
    /// Returns None when the queue has nothing pending for the filter.
    /// Resuming restores the saved counters and detail log and continues
    /// from the first remaining pending item; already-applied items are
    /// never replayed.
    pub async fn review(
        &self,
        media_filter: Option<Vec<MediaType>>,
        resume_session: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<Option<ReviewOutcome>> {
        queue::prune_inactive(&self.db).await?;

        let mut media_filter = media_filter;
        if queue::count_queue_items(
            &self.db,
            Some(QueueStatus::Pending),
            media_filter.as_deref(),
        )
        .await?
            == 0
        {
            return Ok(None);
        }

        let (session_id, mut stats) = match resume_session {
            Some(session_id) => {
                let session = sessions::get_session(&self.db, session_id)
                    .await?
                    .ok_or_else(|| {
                        artfetch_common::Error::NotFound(format!("session {}", session_id))
                    })?;
                if !session.media_types.is_empty() {
                    media_filter = Some(session.media_types.clone());
                }
                sessions::resume_session(&self.db, session_id).await?;
                tracing::info!(session_id, "Resuming review session");
                (session_id, session.stats)
            }
            None => {
                let media_types = media_filter.clone().unwrap_or_default();
                let session_id =
                    sessions::create_session(&self.db, "manual_review", &media_types, &[]).await?;
                tracing::debug!(session_id, "Created review session");
                (session_id, SessionStats::default())
            }
        };

        let mut cancelled = false;

        'outer: while !cancelled {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let batch = queue::next_batch(
                &self.db,
                BATCH_SIZE,
                QueueStatus::Pending,
                media_filter.as_deref(),
            )
            .await?;
            if batch.is_empty() {
                break;
            }

            let queue_ids: Vec<i64> = batch.iter().map(|entry| entry.id).collect();
            let mut items_by_queue = queue::art_items_for(&self.db, &queue_ids).await?;

            for entry in &batch {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'outer;
                }

                let art_items = items_by_queue.remove(&entry.id).unwrap_or_default();

                let live_art = match self.library.item_art(entry.media_type, entry.library_id).await
                {
                    Ok(art) => art,
                    Err(e) => {
                        tracing::error!(
                            title = %entry.title,
                            "Failed to read live artwork, marking item errored: {}", e
                        );
                        queue::set_queue_status(&self.db, entry.id, QueueStatus::Error).await?;
                        continue;
                    }
                };

                let pending = self
                    .validate_art_items(entry, art_items, &live_art, &mut stats)
                    .await?;

                if pending.is_empty() {
                    // Nothing left to review (resolved earlier or just gone
                    // stale): close the entry so the drain loop moves on.
                    queue::set_queue_status(&self.db, entry.id, QueueStatus::Completed).await?;
                    sessions::update_stats(&self.db, session_id, &stats).await?;
                    continue;
                }

                let result = self
                    .review_single_item(entry, pending, &live_art, &mut stats)
                    .await?;

                match result {
                    ItemResult::Applied => stats.applied += 1,
                    ItemResult::Skipped => stats.skipped += 1,
                    ItemResult::Auto => stats.auto += 1,
                    ItemResult::Cancel => cancelled = true,
                }

                stats.remaining = queue::count_queue_items(
                    &self.db,
                    Some(QueueStatus::Pending),
                    media_filter.as_deref(),
                )
                .await?;
                sessions::update_stats(&self.db, session_id, &stats).await?;

                if cancelled {
                    break 'outer;
                }
            }
        }

        let remaining = queue::count_queue_items(
            &self.db,
            Some(QueueStatus::Pending),
            media_filter.as_deref(),
        )
        .await?;
        stats.remaining = remaining;

        if cancelled {
            sessions::pause_session(&self.db, session_id, &stats).await?;
            self.events.emit_lossy(ArtEvent::SessionPaused {
                session_id,
                timestamp: chrono::Utc::now(),
            });
        } else {
            sessions::update_stats(&self.db, session_id, &stats).await?;
            sessions::complete_session(&self.db, session_id).await?;
        }

        tracing::info!(
            session_id,
            applied = stats.applied,
            skipped = stats.skipped,
            auto = stats.auto,
            remaining,
            cancelled,
            "Review run finished"
        );

        queue::prune_inactive(&self.db).await?;

        Ok(Some(ReviewOutcome {
            session_id,
            cancelled,
            remaining,
            stats,
        }))
    }

    /// Drop art items whose scan-time assumption no longer holds.
    ///
    /// A missing-mode item is stale once the slot is occupied; a
    /// candidate-mode item is stale once the live URL differs from its
    /// recorded baseline.
    async fn validate_art_items(
        &self,
        entry: &QueueEntry,
        art_items: Vec<ArtItemEntry>,
        live_art: &HashMap<ArtType, String>,
        stats: &mut SessionStats,
    ) -> Result<Vec<ArtItemEntry>> {
        let mut pending = Vec::new();

        for item in art_items {
            if item.status != ArtItemStatus::Pending {
                continue;
            }

            let live_url = live_art.get(&item.art_type).cloned().unwrap_or_default();
            let stale_reason = match item.review_mode {
                ReviewMode::Missing if !live_url.is_empty() => Some("artwork_no_longer_missing"),
                ReviewMode::Candidate if live_url != item.baseline_url => {
                    Some("baseline_changed")
                }
                _ => None,
            };

            match stale_reason {
                Some(reason) => {
                    queue::set_art_item_status(&self.db, item.id, ArtItemStatus::Stale).await?;
                    stats.details.record_stale(detail(entry, Some(item.art_type), None, reason));
                }
                None => pending.push(item),
            }
        }

        Ok(pending)
    }

    async fn review_single_item(
        &self,
        entry: &QueueEntry,
        mut art_items: Vec<ArtItemEntry>,
        live_art: &HashMap<ArtType, String>,
        stats: &mut SessionStats,
    ) -> Result<ItemResult> {
        art_items.sort_by_key(|item| item.art_type.review_priority());

        let all_art = match self
            .source
            .fetch_all(entry.media_type, entry.library_id, true)
            .await
        {
            Ok(art) => art,
            Err(e) => {
                tracing::error!(title = %entry.title, "Failed to load artwork options: {}", e);
                HashMap::new()
            }
        };

        let mut applied_any = false;
        let mut had_options = false;
        let mut auto_logged = false;

        for item in &art_items {
            let full = all_art
                .get(&item.art_type)
                .cloned()
                .unwrap_or_default();
            let filtered = filter_for_review(&full, item.art_type, &self.policy);

            if filtered.is_empty() {
                stats
                    .details
                    .record_auto(detail(entry, Some(item.art_type), None, "no_options"));
                auto_logged = true;
                continue;
            }

            had_options = true;

            let outcome = self
                .chooser
                .present(ChooserRequest {
                    title: entry.title.clone(),
                    year: entry.year.clone(),
                    media_type: entry.media_type,
                    art_type: item.art_type,
                    candidates: filtered,
                    all_candidates: full,
                    current_url: live_art.get(&item.art_type).cloned().unwrap_or_default(),
                    review_mode: item.review_mode,
                })
                .await;

            if !outcome.extra_selections.is_empty() {
                let updates: HashMap<String, String> =
                    outcome.extra_selections.iter().cloned().collect();
                if let Err(e) = self
                    .library
                    .set_item_art(entry.media_type, entry.library_id, &updates)
                    .await
                {
                    tracing::error!(title = %entry.title, "Failed to apply extra art: {}", e);
                }
            }

            match outcome.action {
                ChooserAction::Cancel => {
                    return Ok(self.handle_cancel(entry, applied_any).await?);
                }
                ChooserAction::Skip => {
                    queue::set_art_item_status(&self.db, item.id, ArtItemStatus::Skipped).await?;
                    stats
                        .details
                        .record_skipped(detail(entry, Some(item.art_type), None, "user_skip"));
                }
                ChooserAction::Selected(candidate) => {
                    if self.apply_selected(entry, item, &candidate, stats).await? {
                        applied_any = true;
                    }
                }
            }
        }

        if applied_any {
            queue::set_queue_status(&self.db, entry.id, QueueStatus::Completed).await?;
            return Ok(ItemResult::Applied);
        }

        queue::set_queue_status(&self.db, entry.id, QueueStatus::Skipped).await?;
        if !had_options && !auto_logged {
            for item in &art_items {
                stats.details.record_auto(detail(
                    entry,
                    Some(item.art_type),
                    None,
                    "no_artwork_available",
                ));
            }
        }

        Ok(if had_options {
            ItemResult::Skipped
        } else {
            ItemResult::Auto
        })
    }

    /// Re-verify against live state immediately before applying (the library
    /// may have changed since the choice was presented), then apply.
    ///
    /// Returns true when the artwork was applied.
    async fn apply_selected(
        &self,
        entry: &QueueEntry,
        item: &ArtItemEntry,
        candidate: &crate::models::ArtworkCandidate,
        stats: &mut SessionStats,
    ) -> Result<bool> {
        let latest = match self.library.item_art(entry.media_type, entry.library_id).await {
            Ok(art) => art,
            Err(e) => {
                tracing::error!(title = %entry.title, "Pre-apply verification failed: {}", e);
                queue::set_art_item_status(&self.db, item.id, ArtItemStatus::Error).await?;
                return Ok(false);
            }
        };

        let live_url = latest.get(&item.art_type).cloned().unwrap_or_default();
        let gone_stale = match item.review_mode {
            ReviewMode::Missing => !live_url.is_empty(),
            ReviewMode::Candidate => live_url != item.baseline_url,
        };

        if gone_stale {
            queue::set_art_item_status(&self.db, item.id, ArtItemStatus::Stale).await?;
            stats.details.record_stale(detail(
                entry,
                Some(item.art_type),
                None,
                "changed_before_apply",
            ));
            return Ok(false);
        }

        let mut updates = HashMap::new();
        updates.insert(item.art_type.as_str().to_string(), candidate.url.clone());

        if let Err(e) = self
            .library
            .set_item_art(entry.media_type, entry.library_id, &updates)
            .await
        {
            tracing::error!(title = %entry.title, "Failed to apply artwork: {}", e);
            queue::set_art_item_status(&self.db, item.id, ArtItemStatus::Error).await?;
            return Ok(false);
        }

        queue::mark_art_item_selected(&self.db, item.id, &candidate.url, false).await?;

        tracing::info!(
            title = %entry.title,
            art_type = %item.art_type,
            source = %candidate.source,
            url = %candidate.url,
            "Applied artwork"
        );
        stats.details.record_applied(ReviewDetail {
            title: entry.title.clone(),
            art_type: Some(item.art_type),
            media_type: entry.media_type,
            library_id: entry.library_id,
            url: Some(candidate.url.clone()),
            source: Some(candidate.source.clone()),
            reason: None,
            timestamp: chrono::Utc::now(),
        });
        self.events.emit_lossy(ArtEvent::ArtworkApplied {
            title: entry.title.clone(),
            art_type: item.art_type.as_str().to_string(),
            url: candidate.url.clone(),
            auto_applied: false,
            timestamp: chrono::Utc::now(),
        });

        Ok(true)
    }

    /// User cancelled mid-item: the entry stays pending if nothing was
    /// applied yet, completed if something already was.
    async fn handle_cancel(&self, entry: &QueueEntry, applied_any: bool) -> Result<ItemResult> {
        if applied_any {
            queue::set_queue_status(&self.db, entry.id, QueueStatus::Completed).await?;
            Ok(ItemResult::Applied)
        } else {
            queue::set_queue_status(&self.db, entry.id, QueueStatus::Pending).await?;
            Ok(ItemResult::Cancel)
        }
    }
}

fn detail(
    entry: &QueueEntry,
    art_type: Option<ArtType>,
    url: Option<String>,
    reason: &str,
) -> ReviewDetail {
    ReviewDetail {
        title: entry.title.clone(),
        art_type,
        media_type: entry.media_type,
        library_id: entry.library_id,
        url,
        source: None,
        reason: Some(reason.to_string()),
        timestamp: chrono::Utc::now(),
    }
}
