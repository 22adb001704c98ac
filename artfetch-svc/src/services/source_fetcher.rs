//! Coordinated provider fetch for one media item.
//!
//! Fetches every artwork type for an item in one pass: resolve external ids
//! once, check the cache completion marker, and on a miss issue exactly one
//! multi-type request per provider. Results are cached with a release-age
//! TTL, then finalized (dimension backfill, popularity ranking).

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::fanarttv::FanartTvClient;
use super::fetch::FetchError;
use super::ranking::{rank, LanguagePolicy};
use super::tmdb::TmdbClient;
use crate::db::cache;
use crate::library::MediaLibrary;
use crate::models::{ArtType, ArtworkCandidate, MediaType, SortMode, SourcePreference};

pub type ArtworkMap = HashMap<ArtType, Vec<ArtworkCandidate>>;

/// Source of ranked artwork candidates for a library item.
///
/// The scanner, reviewer and processor all consume this; tests inject fakes.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// All candidates for one item, keyed by art type, each list ranked.
    ///
    /// `bypass_cache` forces a fresh provider fetch (manual review wants
    /// live data).
    async fn fetch_all(
        &self,
        media_type: MediaType,
        library_id: i64,
        bypass_cache: bool,
    ) -> artfetch_common::Result<ArtworkMap>;
}

pub struct SourceFetcher {
    db: SqlitePool,
    library: Arc<dyn MediaLibrary>,
    tmdb: Option<TmdbClient>,
    fanart: FanartTvClient,
    policy: LanguagePolicy,
    /// Set when a provider exhausted its rate-limit budget; it is skipped
    /// for the remainder of the run
    tmdb_disabled: AtomicBool,
    fanart_disabled: AtomicBool,
}

impl SourceFetcher {
    pub fn new(
        db: SqlitePool,
        library: Arc<dyn MediaLibrary>,
        tmdb: Option<TmdbClient>,
        fanart: FanartTvClient,
        policy: LanguagePolicy,
    ) -> Self {
        if tmdb.is_none() {
            tracing::warn!("No TMDB API key configured; TMDB artwork disabled");
        }
        Self {
            db,
            library,
            tmdb,
            fanart,
            policy,
            tmdb_disabled: AtomicBool::new(false),
            fanart_disabled: AtomicBool::new(false),
        }
    }

    /// Record a provider failure. Rate-limit exhaustion disables the
    /// provider for the rest of the run; other errors are logged and the
    /// remaining providers proceed.
    fn note_provider_error(&self, error: &FetchError, disabled: &AtomicBool) {
        match error {
            FetchError::RateLimited { service, attempts } => {
                tracing::warn!(
                    service = %service,
                    attempts,
                    "Provider rate limit exhausted, skipping for the rest of this run"
                );
                disabled.store(true, Ordering::Relaxed);
            }
            FetchError::Network { service, message } => {
                tracing::warn!(service = %service, "Provider unavailable: {}", message);
            }
        }
    }

    async fn load_cached(
        &self,
        media_type: MediaType,
        tmdb_id: u64,
        tvdb_id: Option<u64>,
    ) -> artfetch_common::Result<ArtworkMap> {
        let fanart_cache_id = fanart_cache_id(media_type, tmdb_id, tvdb_id);
        let media_ids = vec![
            ("tmdb".to_string(), tmdb_id.to_string()),
            ("fanart.tv".to_string(), fanart_cache_id),
        ];

        let batch = cache::get_cached_batch(&self.db, media_type.as_str(), &media_ids).await?;

        let mut result: ArtworkMap = HashMap::new();
        for ((_source, art_type), candidates) in batch {
            if let Ok(art_type) = art_type.parse::<ArtType>() {
                result.entry(art_type).or_default().extend(candidates);
            }
        }
        Ok(result)
    }

    async fn fetch_movie_or_show(
        &self,
        media_type: MediaType,
        library_id: i64,
        bypass_cache: bool,
    ) -> artfetch_common::Result<ArtworkMap> {
        let ids = self
            .library
            .external_ids(media_type, library_id)
            .await
            .map_err(|e| artfetch_common::Error::Internal(e.to_string()))?;

        let Some(tmdb_id) = ids.tmdb_id else {
            tracing::debug!(
                media_type = %media_type,
                library_id,
                "No TMDB id known to the library, nothing to fetch"
            );
            return Ok(HashMap::new());
        };

        let release_date = ids.premiered.as_deref();
        let ttl_hours = cache::cache_ttl_hours(release_date, chrono::Utc::now());

        if !bypass_cache
            && cache::has_completion_marker(&self.db, media_type.as_str(), &tmdb_id.to_string())
                .await?
        {
            let cached = self.load_cached(media_type, tmdb_id, ids.tvdb_id).await?;
            return Ok(self.finalize(cached));
        }

        let mut all_art: ArtworkMap = HashMap::new();

        if let Some(tmdb) = &self.tmdb {
            if !self.tmdb_disabled.load(Ordering::Relaxed) {
                match tmdb.images(media_type, tmdb_id).await {
                    Ok(art) => {
                        for (art_type, candidates) in art {
                            cache::put_cached(
                                &self.db,
                                media_type.as_str(),
                                &tmdb_id.to_string(),
                                "tmdb",
                                art_type.as_str(),
                                &candidates,
                                release_date,
                                ttl_hours,
                            )
                            .await?;
                            all_art.entry(art_type).or_default().extend(candidates);
                        }
                    }
                    Err(e) => self.note_provider_error(&e, &self.tmdb_disabled),
                }
            }
        }

        if !self.fanart_disabled.load(Ordering::Relaxed) {
            let fanart_result = match (media_type, ids.tvdb_id) {
                (MediaType::TvShow, Some(tvdb_id)) => self.fanart.tv_artwork(tvdb_id).await,
                (MediaType::TvShow, None) => Ok(HashMap::new()),
                _ => self.fanart.movie_artwork(tmdb_id).await,
            };

            match fanart_result {
                Ok(art) => {
                    let cache_id = fanart_cache_id(media_type, tmdb_id, ids.tvdb_id);
                    for (art_type, candidates) in art {
                        if candidates.is_empty() {
                            continue;
                        }
                        cache::put_cached(
                            &self.db,
                            media_type.as_str(),
                            &cache_id,
                            "fanart.tv",
                            art_type.as_str(),
                            &candidates,
                            release_date,
                            ttl_hours,
                        )
                        .await?;
                        all_art.entry(art_type).or_default().extend(candidates);
                    }
                }
                Err(e) => self.note_provider_error(&e, &self.fanart_disabled),
            }
        }

        cache::write_completion_marker(
            &self.db,
            media_type.as_str(),
            &tmdb_id.to_string(),
            release_date,
            ttl_hours,
        )
        .await?;

        let finalized = self.finalize(all_art);

        let total: usize = finalized.values().map(Vec::len).sum();
        tracing::info!(
            media_type = %media_type,
            library_id,
            total,
            types = finalized.len(),
            "Fetched artwork"
        );

        Ok(finalized)
    }

    async fn fetch_season(&self, season_id: i64) -> artfetch_common::Result<ArtworkMap> {
        let Some((show_id, season_number)) = self
            .library
            .season_info(season_id)
            .await
            .map_err(|e| artfetch_common::Error::Internal(e.to_string()))?
        else {
            return Ok(HashMap::new());
        };

        let ids = self
            .library
            .external_ids(MediaType::TvShow, show_id)
            .await
            .map_err(|e| artfetch_common::Error::Internal(e.to_string()))?;

        let Some(tmdb_id) = ids.tmdb_id else {
            return Ok(HashMap::new());
        };

        let mut all_art: ArtworkMap = HashMap::new();

        if let Some(tmdb) = &self.tmdb {
            if !self.tmdb_disabled.load(Ordering::Relaxed) {
                match tmdb.season_images(tmdb_id, season_number).await {
                    Ok(art) => {
                        for (art_type, candidates) in art {
                            all_art.entry(art_type).or_default().extend(candidates);
                        }
                    }
                    Err(e) => self.note_provider_error(&e, &self.tmdb_disabled),
                }
            }
        }

        if let Some(tvdb_id) = ids.tvdb_id {
            if !self.fanart_disabled.load(Ordering::Relaxed) {
                match self.fanart.season_artwork(tvdb_id, season_number).await {
                    Ok(art) => {
                        for (art_type, candidates) in art {
                            all_art.entry(art_type).or_default().extend(candidates);
                        }
                    }
                    Err(e) => self.note_provider_error(&e, &self.fanart_disabled),
                }
            }
        }

        Ok(self.finalize(all_art))
    }

    async fn fetch_episode(&self, episode_id: i64) -> artfetch_common::Result<ArtworkMap> {
        let Some((show_id, season_number, episode_number)) = self
            .library
            .episode_info(episode_id)
            .await
            .map_err(|e| artfetch_common::Error::Internal(e.to_string()))?
        else {
            return Ok(HashMap::new());
        };

        let ids = self
            .library
            .external_ids(MediaType::TvShow, show_id)
            .await
            .map_err(|e| artfetch_common::Error::Internal(e.to_string()))?;

        let (Some(tmdb), Some(tmdb_id)) = (&self.tmdb, ids.tmdb_id) else {
            return Ok(HashMap::new());
        };

        if self.tmdb_disabled.load(Ordering::Relaxed) {
            return Ok(HashMap::new());
        }

        match tmdb
            .episode_images(tmdb_id, season_number, episode_number)
            .await
        {
            Ok(art) => Ok(self.finalize(art)),
            Err(e) => {
                self.note_provider_error(&e, &self.tmdb_disabled);
                Ok(HashMap::new())
            }
        }
    }

    /// Backfill missing dimensions with per-type defaults, then rank each
    /// list by popularity.
    fn finalize(&self, mut artwork: ArtworkMap) -> ArtworkMap {
        for (art_type, candidates) in artwork.iter_mut() {
            for candidate in candidates.iter_mut() {
                if candidate.width == 0 || candidate.height == 0 {
                    let (width, height) = art_type.default_dimensions();
                    candidate.width = width;
                    candidate.height = height;
                }
            }
            *candidates = rank(
                candidates,
                *art_type,
                SortMode::Popularity,
                SourcePreference::All,
                &self.policy,
            );
        }
        artwork.retain(|_, candidates| !candidates.is_empty());
        artwork
    }
}

fn fanart_cache_id(media_type: MediaType, tmdb_id: u64, tvdb_id: Option<u64>) -> String {
    match (media_type, tvdb_id) {
        (MediaType::TvShow, Some(tvdb_id)) => tvdb_id.to_string(),
        _ => tmdb_id.to_string(),
    }
}

#[async_trait]
impl CandidateSource for SourceFetcher {
    async fn fetch_all(
        &self,
        media_type: MediaType,
        library_id: i64,
        bypass_cache: bool,
    ) -> artfetch_common::Result<ArtworkMap> {
        match media_type {
            MediaType::Movie | MediaType::TvShow => {
                self.fetch_movie_or_show(media_type, library_id, bypass_cache)
                    .await
            }
            MediaType::Season => self.fetch_season(library_id).await,
            MediaType::Episode => self.fetch_episode(library_id).await,
            // No provider path for music videos yet.
            MediaType::MusicVideo => Ok(HashMap::new()),
        }
    }
}
