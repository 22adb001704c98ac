//! Library scanner: discovers missing artwork and upgrade candidates and
//! queues them durably under a scan session.
//!
//! A scan walks the registered collections (movies, shows, seasons) for one
//! scope. Cancellation at any point pauses the session with partial results
//! already queued; a collection failure cancels the session and aborts.

use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use artfetch_common::events::{ArtEvent, EventBus};

use super::precache::PrecachePool;
use super::ranking::LanguagePolicy;
use super::source_fetcher::{ArtworkMap, CandidateSource};
use crate::db::{queue, sessions, textures};
use crate::library::{LibraryError, LibraryItem, MediaLibrary};
use crate::models::{
    normalize_language_tag, ArtType, ArtworkCandidate, EnqueueSpec, MediaType, SessionStats,
};
use crate::models::queue::ArtRequest;

/// Upgrade detection heuristics. Product tuning, not protocol: exposed as
/// configuration rather than hard-coded at the call sites.
#[derive(Debug, Clone)]
pub struct UpgradeThresholds {
    /// A candidate must have at least this multiple of the baseline pixels
    pub pixel_ratio: f64,
    /// Or beat the baseline rating by this much
    pub rating_delta: f64,
    /// Or beat the baseline likes by this many
    pub likes_delta: u32,
}

impl Default for UpgradeThresholds {
    fn default() -> Self {
        Self {
            pixel_ratio: 1.25,
            rating_delta: 0.5,
            likes_delta: 10,
        }
    }
}

/// What to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanScope {
    Movies,
    TvShows,
    All,
}

impl ScanScope {
    /// Media types recorded on the session (the session's scope identity).
    pub fn media_types(&self) -> Vec<MediaType> {
        match self {
            ScanScope::Movies => vec![MediaType::Movie],
            ScanScope::TvShows => vec![MediaType::TvShow, MediaType::Season],
            ScanScope::All => vec![MediaType::Movie, MediaType::TvShow, MediaType::Season],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanScope::Movies => "movies",
            ScanScope::TvShows => "tvshows",
            ScanScope::All => "all",
        }
    }
}

impl FromStr for ScanScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movies" => Ok(ScanScope::Movies),
            "tvshows" => Ok(ScanScope::TvShows),
            "all" => Ok(ScanScope::All),
            other => Err(format!("unknown scan scope: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Also look for quality upgrades to artwork that already exists
    pub include_upgrades: bool,
    /// The user approved the bulk texture caching pass upgrade detection
    /// may need
    pub confirm_precache: bool,
    /// Override the per-media-type art type defaults
    pub art_types: Option<Vec<ArtType>>,
    pub thresholds: UpgradeThresholds,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("storage error: {0}")]
    Storage(#[from] artfetch_common::Error),

    #[error("scanning {media_type} failed: {source}")]
    Collection {
        media_type: MediaType,
        source: LibraryError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Completed,
    /// Cancelled mid-run; partial results are queued and the session can be
    /// resumed
    Paused,
    /// Upgrade detection needs a texture caching pass the user has not
    /// confirmed yet
    PrecacheRequired,
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub session_id: i64,
    pub status: ScanStatus,
    pub scanned: u64,
    pub queued: u64,
    pub precache_pending: u64,
}

pub struct Scanner {
    db: SqlitePool,
    library: Arc<dyn MediaLibrary>,
    source: Arc<dyn CandidateSource>,
    events: EventBus,
    policy: LanguagePolicy,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(
        db: SqlitePool,
        library: Arc<dyn MediaLibrary>,
        source: Arc<dyn CandidateSource>,
        events: EventBus,
        policy: LanguagePolicy,
        options: ScanOptions,
    ) -> Self {
        Self {
            db,
            library,
            source,
            events,
            policy,
            options,
        }
    }

    fn art_types_for(&self, media_type: MediaType) -> Vec<ArtType> {
        let defaults = media_type.default_art_types();
        match &self.options.art_types {
            Some(selected) => defaults
                .into_iter()
                .filter(|art_type| selected.contains(art_type))
                .collect(),
            None => defaults,
        }
    }

    /// Create or resume the session for this scan.
    ///
    /// Exactly one active or paused session exists per media-type-set scope:
    /// resuming reuses the paused session, otherwise any paused session for
    /// the same scope is explicitly cancelled before a fresh one starts.
    pub async fn begin_session(
        &self,
        scope: ScanScope,
        resume_session: Option<i64>,
    ) -> Result<i64, ScanError> {
        let media_types = scope.media_types();

        if let Some(session_id) = resume_session {
            sessions::resume_session(&self.db, session_id).await?;
            tracing::info!(session_id, "Resuming scan session");
            return Ok(session_id);
        }

        if let Some(paused) =
            sessions::find_matching_paused(&self.db, &["missing_art"], &media_types).await?
        {
            tracing::info!(
                session_id = paused.id,
                "Cancelling paused session for the same scope before starting fresh"
            );
            sessions::cancel_session(&self.db, paused.id).await?;
            queue::clear_for_media(&self.db, &media_types).await?;
        }

        let art_types: Vec<ArtType> = media_types
            .iter()
            .flat_map(|media_type| self.art_types_for(*media_type))
            .fold(Vec::new(), |mut acc, art_type| {
                if !acc.contains(&art_type) {
                    acc.push(art_type);
                }
                acc
            });

        let session_id =
            sessions::create_session(&self.db, "missing_art", &media_types, &art_types).await?;
        Ok(session_id)
    }

    /// Run the scan for a session created by [`begin_session`].
    pub async fn scan(
        &self,
        scope: ScanScope,
        session_id: i64,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        tracing::info!(session_id, scope = scope.as_str(), "Starting library scan");
        self.events.emit_lossy(ArtEvent::ScanStarted {
            session_id,
            scope: scope.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        });

        // List every collection up front; a listing failure aborts the whole
        // scan before anything is queued.
        let mut collections: Vec<(MediaType, Vec<LibraryItem>)> = Vec::new();
        for media_type in scope.media_types() {
            match self.library.list_items(media_type).await {
                Ok(items) => collections.push((media_type, items)),
                Err(source) => {
                    sessions::cancel_session(&self.db, session_id).await?;
                    return Err(ScanError::Collection { media_type, source });
                }
            }
        }

        // Upgrade detection needs true dimensions for existing artwork. Any
        // URLs we cannot measure yet go through the bulk caching pass, which
        // requires explicit confirmation.
        if self.options.include_upgrades {
            let unknown = self.collect_unmeasured_urls(&collections).await?;
            if !unknown.is_empty() {
                textures::enqueue_precache(&self.db, &unknown).await?;
                let pending = textures::pending_precache_count(&self.db).await?;

                if !self.options.confirm_precache {
                    sessions::pause_session(&self.db, session_id, &SessionStats::default())
                        .await?;
                    self.events.emit_lossy(ArtEvent::PrecacheRequired {
                        session_id,
                        pending,
                        timestamp: chrono::Utc::now(),
                    });
                    tracing::info!(
                        session_id,
                        pending,
                        "Upgrade detection needs a texture caching pass; awaiting confirmation"
                    );
                    return Ok(ScanOutcome {
                        session_id,
                        status: ScanStatus::PrecacheRequired,
                        scanned: 0,
                        queued: 0,
                        precache_pending: pending,
                    });
                }

                let pool = PrecachePool::new(self.db.clone(), self.events.clone());
                pool.run(cancel).await?;

                if cancel.is_cancelled() {
                    sessions::pause_session(&self.db, session_id, &SessionStats::default())
                        .await?;
                    self.events.emit_lossy(ArtEvent::SessionPaused {
                        session_id,
                        timestamp: chrono::Utc::now(),
                    });
                    let remaining = textures::pending_precache_count(&self.db).await?;
                    return Ok(ScanOutcome {
                        session_id,
                        status: ScanStatus::Paused,
                        scanned: 0,
                        queued: 0,
                        precache_pending: remaining,
                    });
                }
            }
        }

        let mut scanned = 0u64;
        let mut queued = 0u64;
        let mut cancelled = false;

        for (media_type, items) in &collections {
            if cancelled {
                break;
            }

            let batch =
                self.scan_collection(*media_type, items, session_id, &mut scanned, cancel)
                    .await?;

            // Write whatever was discovered, including a partial batch from
            // a cancelled pass, in one transaction.
            queued += batch.len() as u64;
            queue::enqueue_batch(&self.db, &batch).await?;

            self.events.emit_lossy(ArtEvent::ScanProgress {
                session_id,
                scanned,
                queued,
                current: media_type.as_str().to_string(),
                timestamp: chrono::Utc::now(),
            });

            if cancel.is_cancelled() {
                cancelled = true;
            }
        }

        let stats = SessionStats {
            scanned,
            queued,
            ..Default::default()
        };

        if cancelled {
            sessions::pause_session(&self.db, session_id, &stats).await?;
            self.events.emit_lossy(ArtEvent::SessionPaused {
                session_id,
                timestamp: chrono::Utc::now(),
            });
            tracing::info!(session_id, scanned, queued, "Scan paused");
            return Ok(ScanOutcome {
                session_id,
                status: ScanStatus::Paused,
                scanned,
                queued,
                precache_pending: 0,
            });
        }

        sessions::update_stats(&self.db, session_id, &stats).await?;
        sessions::complete_session(&self.db, session_id).await?;
        self.events.emit_lossy(ArtEvent::ScanCompleted {
            session_id,
            scanned,
            queued,
            timestamp: chrono::Utc::now(),
        });
        tracing::info!(session_id, scanned, queued, "Scan complete");

        Ok(ScanOutcome {
            session_id,
            status: ScanStatus::Completed,
            scanned,
            queued,
            precache_pending: 0,
        })
    }

    /// URLs of existing artwork whose dimensions are not known locally or to
    /// the library.
    async fn collect_unmeasured_urls(
        &self,
        collections: &[(MediaType, Vec<LibraryItem>)],
    ) -> Result<Vec<String>, ScanError> {
        let mut unknown = Vec::new();

        for (media_type, items) in collections {
            let art_types = self.art_types_for(*media_type);
            for item in items {
                for art_type in &art_types {
                    let Some(url) = item.art.get(art_type) else {
                        continue;
                    };
                    if textures::texture_dimensions(&self.db, url).await?.is_some() {
                        continue;
                    }
                    match self.library.texture_dimensions(url).await {
                        Ok(Some((width, height))) => {
                            textures::put_texture(&self.db, url, width, height).await?;
                        }
                        Ok(None) => {
                            if !unknown.contains(url) {
                                unknown.push(url.clone());
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Texture dimension lookup failed for {}: {}", url, e);
                            if !unknown.contains(url) {
                                unknown.push(url.clone());
                            }
                        }
                    }
                }
            }
        }

        Ok(unknown)
    }

    async fn scan_collection(
        &self,
        media_type: MediaType,
        items: &[LibraryItem],
        session_id: i64,
        scanned: &mut u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<EnqueueSpec>, ScanError> {
        let art_types = self.art_types_for(media_type);
        let mut specs: Vec<EnqueueSpec> = Vec::new();

        for item in items {
            if cancel.is_cancelled() {
                break;
            }

            *scanned += 1;

            let missing: Vec<ArtType> = art_types
                .iter()
                .copied()
                .filter(|art_type| !item.art.contains_key(art_type))
                .collect();

            let mut candidates: Vec<(ArtType, String)> = Vec::new();
            if self.options.include_upgrades && item.art.iter().any(|(_, url)| !url.is_empty()) {
                let fresh = match self.source.fetch_all(media_type, item.id, false).await {
                    Ok(fresh) => fresh,
                    Err(e) => {
                        tracing::warn!(
                            media_type = %media_type,
                            library_id = item.id,
                            "Candidate fetch failed during upgrade detection: {}", e
                        );
                        ArtworkMap::new()
                    }
                };

                for art_type in &art_types {
                    let Some(current_url) = item.art.get(art_type) else {
                        continue;
                    };
                    let fresh_for_type = fresh.get(art_type).map(Vec::as_slice).unwrap_or(&[]);
                    if self
                        .check_for_upgrade(media_type, item.id, *art_type, current_url, fresh_for_type)
                        .await?
                    {
                        candidates.push((*art_type, current_url.clone()));
                    }
                }
            }

            if missing.is_empty() && candidates.is_empty() {
                continue;
            }

            let mut spec = EnqueueSpec::new(media_type, item.id, item.title.clone());
            spec.year = item.year.map(|y| y.to_string()).unwrap_or_default();
            spec.scope = format!("{}s", media_type.as_str());
            spec.scan_session_id = Some(session_id);
            spec.art_requests = missing
                .iter()
                .map(|art_type| ArtRequest::missing(*art_type))
                .chain(
                    candidates
                        .iter()
                        .map(|(art_type, url)| ArtRequest::candidate(*art_type, url.clone())),
                )
                .collect();

            specs.push(spec);
        }

        tracing::info!(
            media_type = %media_type,
            total = items.len(),
            queued = specs.len(),
            "Collection scanned"
        );

        Ok(specs)
    }

    /// Decide whether fresh provider data offers a material upgrade over the
    /// artwork currently in the slot.
    ///
    /// Baseline quality comes from the cached texture's true dimensions when
    /// available; URL string matching against provider results is the
    /// fallback, since providers rename assets.
    async fn check_for_upgrade(
        &self,
        media_type: MediaType,
        library_id: i64,
        art_type: ArtType,
        current_url: &str,
        fresh: &[ArtworkCandidate],
    ) -> Result<bool, ScanError> {
        if fresh.is_empty() || current_url.is_empty() {
            return Ok(false);
        }

        let filtered: Vec<&ArtworkCandidate> = fresh
            .iter()
            .filter(|candidate| {
                if candidate.url.is_empty() {
                    return false;
                }
                if self.policy.preferred.is_empty() {
                    return true;
                }
                normalize_language_tag(Some(&candidate.language)) == self.policy.preferred
            })
            .collect();

        if filtered.is_empty() {
            return Ok(false);
        }

        let mut baseline_pixels = 0u64;
        let mut baseline_rating = 0.0f64;
        let mut baseline_likes = 0u32;

        let dimensions = match textures::texture_dimensions(&self.db, current_url).await? {
            Some(dims) => Some(dims),
            None => match self.library.texture_dimensions(current_url).await {
                Ok(Some(dims)) => {
                    textures::put_texture(&self.db, current_url, dims.0, dims.1).await?;
                    Some(dims)
                }
                _ => None,
            },
        };

        if let Some((width, height)) = dimensions {
            baseline_pixels = width as u64 * height as u64;
        } else if let Some(matched) = filtered.iter().find(|c| c.url == current_url) {
            baseline_pixels = matched.pixels();
            baseline_rating = matched.rating;
            baseline_likes = matched.likes;
        }

        if baseline_pixels == 0 {
            return Ok(false);
        }

        let best = filtered
            .iter()
            .max_by(|a, b| {
                a.pixels()
                    .cmp(&b.pixels())
                    .then_with(|| signal_of(a).total_cmp(&signal_of(b)))
            })
            .expect("non-empty candidate list");

        let thresholds = &self.options.thresholds;
        let mut is_upgrade = false;

        if best.pixels() as f64 >= baseline_pixels as f64 * thresholds.pixel_ratio {
            is_upgrade = true;
        }
        if best.rating > 0.0
            && baseline_rating > 0.0
            && best.rating >= baseline_rating + thresholds.rating_delta
        {
            is_upgrade = true;
        }
        if best.likes > 0
            && baseline_likes > 0
            && best.likes >= baseline_likes + thresholds.likes_delta
        {
            is_upgrade = true;
        }

        if is_upgrade {
            tracing::debug!(
                media_type = %media_type,
                library_id,
                art_type = %art_type,
                baseline_pixels,
                best_pixels = best.pixels(),
                "Quality upgrade detected"
            );
        }

        Ok(is_upgrade)
    }

    /// Scan a single library item, outside any session.
    ///
    /// Returns true when the item was queued.
    pub async fn scan_single_item(
        &self,
        media_type: MediaType,
        library_id: i64,
    ) -> Result<bool, ScanError> {
        let item = self
            .library
            .get_item(media_type, library_id)
            .await
            .map_err(|source| ScanError::Collection { media_type, source })?;

        let Some(item) = item else {
            return Ok(false);
        };

        let art_types = self.art_types_for(media_type);
        let missing: Vec<ArtType> = art_types
            .iter()
            .copied()
            .filter(|art_type| !item.art.contains_key(art_type))
            .collect();

        let mut candidates: Vec<(ArtType, String)> = Vec::new();
        if self.options.include_upgrades {
            let fresh = self
                .source
                .fetch_all(media_type, library_id, false)
                .await
                .unwrap_or_default();
            for art_type in &art_types {
                if let Some(current_url) = item.art.get(art_type) {
                    let fresh_for_type = fresh.get(art_type).map(Vec::as_slice).unwrap_or(&[]);
                    if self
                        .check_for_upgrade(media_type, library_id, *art_type, current_url, fresh_for_type)
                        .await?
                    {
                        candidates.push((*art_type, current_url.clone()));
                    }
                }
            }
        }

        if missing.is_empty() && candidates.is_empty() {
            return Ok(false);
        }

        let mut spec = EnqueueSpec::new(media_type, library_id, item.title.clone());
        spec.year = item.year.map(|y| y.to_string()).unwrap_or_default();
        spec.scope = media_type.as_str().to_string();
        spec.art_requests = missing
            .iter()
            .map(|art_type| ArtRequest::missing(*art_type))
            .chain(
                candidates
                    .iter()
                    .map(|(art_type, url)| ArtRequest::candidate(*art_type, url.clone())),
            )
            .collect();

        queue::enqueue(&self.db, spec).await?;
        Ok(true)
    }
}

/// Single quality signal for picking the best candidate during upgrade
/// detection: rating when present, otherwise likes.
fn signal_of(candidate: &ArtworkCandidate) -> f64 {
    if candidate.rating > 0.0 {
        candidate.rating
    } else {
        candidate.likes as f64
    }
}
