//! Shared test fixtures: in-memory database, fake library, fake candidate
//! source and a scripted chooser.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use artfetch_svc::library::{LibraryError, LibraryItem, MediaLibrary};
use artfetch_svc::models::{ArtType, ArtworkCandidate, ExternalIds, MediaType};
use artfetch_svc::services::{
    ArtworkChooser, ArtworkMap, CandidateSource, ChooserOutcome, ChooserRequest,
};

pub async fn setup_db() -> SqlitePool {
    let pool = artfetch_common::db::open_memory_pool().await.unwrap();
    artfetch_svc::db::init_tables(&pool).await.unwrap();
    pool
}

pub fn candidate(url: &str) -> ArtworkCandidate {
    ArtworkCandidate {
        url: url.to_string(),
        preview_url: format!("{}?preview", url),
        width: 1000,
        height: 1500,
        rating: 0.0,
        vote_count: 0,
        likes: 0,
        language: String::new(),
        source: "tmdb".to_string(),
        season: None,
    }
}

pub fn rated_candidate(url: &str, rating: f64, vote_count: u32) -> ArtworkCandidate {
    let mut c = candidate(url);
    c.rating = rating;
    c.vote_count = vote_count;
    c
}

pub fn library_item(media_type: MediaType, id: i64, title: &str) -> LibraryItem {
    LibraryItem {
        id,
        media_type,
        title: title.to_string(),
        year: Some(2016),
        art: HashMap::new(),
        show_id: None,
        season_number: None,
    }
}

/// In-memory media library double.
#[derive(Default)]
pub struct FakeLibrary {
    items: Mutex<HashMap<(MediaType, i64), LibraryItem>>,
    external: Mutex<HashMap<(MediaType, i64), ExternalIds>>,
    textures: Mutex<HashMap<String, (u32, u32)>>,
    pub set_art_calls: Mutex<Vec<(MediaType, i64, HashMap<String, String>)>>,
    pub fail_listing: Mutex<Option<MediaType>>,
}

impl FakeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: LibraryItem) {
        self.items
            .lock()
            .unwrap()
            .insert((item.media_type, item.id), item);
    }

    pub fn set_external_ids(&self, media_type: MediaType, id: i64, ids: ExternalIds) {
        self.external.lock().unwrap().insert((media_type, id), ids);
    }

    pub fn set_texture(&self, url: &str, width: u32, height: u32) {
        self.textures
            .lock()
            .unwrap()
            .insert(url.to_string(), (width, height));
    }

    /// Mutate an item's art map directly (simulating outside changes).
    pub fn set_art(&self, media_type: MediaType, id: i64, art_type: ArtType, url: &str) {
        let mut items = self.items.lock().unwrap();
        if let Some(item) = items.get_mut(&(media_type, id)) {
            if url.is_empty() {
                item.art.remove(&art_type);
            } else {
                item.art.insert(art_type, url.to_string());
            }
        }
    }

    pub fn art_of(&self, media_type: MediaType, id: i64) -> HashMap<ArtType, String> {
        self.items
            .lock()
            .unwrap()
            .get(&(media_type, id))
            .map(|item| item.art.clone())
            .unwrap_or_default()
    }

    pub fn set_art_call_count(&self) -> usize {
        self.set_art_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaLibrary for FakeLibrary {
    async fn list_items(&self, media_type: MediaType) -> Result<Vec<LibraryItem>, LibraryError> {
        if *self.fail_listing.lock().unwrap() == Some(media_type) {
            return Err(LibraryError::Transport("listing failed".to_string()));
        }

        let mut items: Vec<LibraryItem> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|item| item.media_type == media_type)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    async fn get_item(
        &self,
        media_type: MediaType,
        id: i64,
    ) -> Result<Option<LibraryItem>, LibraryError> {
        Ok(self.items.lock().unwrap().get(&(media_type, id)).cloned())
    }

    async fn item_art(
        &self,
        media_type: MediaType,
        id: i64,
    ) -> Result<HashMap<ArtType, String>, LibraryError> {
        self.items
            .lock()
            .unwrap()
            .get(&(media_type, id))
            .map(|item| item.art.clone())
            .ok_or(LibraryError::NotFound { media_type, id })
    }

    async fn set_item_art(
        &self,
        media_type: MediaType,
        id: i64,
        updates: &HashMap<String, String>,
    ) -> Result<(), LibraryError> {
        self.set_art_calls
            .lock()
            .unwrap()
            .push((media_type, id, updates.clone()));

        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(&(media_type, id))
            .ok_or(LibraryError::NotFound { media_type, id })?;
        for (slot, url) in updates {
            if let Ok(art_type) = slot.parse::<ArtType>() {
                item.art.insert(art_type, url.clone());
            }
        }
        Ok(())
    }

    async fn external_ids(
        &self,
        media_type: MediaType,
        id: i64,
    ) -> Result<ExternalIds, LibraryError> {
        Ok(self
            .external
            .lock()
            .unwrap()
            .get(&(media_type, id))
            .cloned()
            .unwrap_or_default())
    }

    async fn texture_dimensions(&self, url: &str) -> Result<Option<(u32, u32)>, LibraryError> {
        Ok(self.textures.lock().unwrap().get(url).copied())
    }

    async fn season_info(&self, season_id: i64) -> Result<Option<(i64, i32)>, LibraryError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&(MediaType::Season, season_id))
            .and_then(|item| Some((item.show_id?, item.season_number?))))
    }

    async fn episode_info(
        &self,
        episode_id: i64,
    ) -> Result<Option<(i64, i32, i32)>, LibraryError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .get(&(MediaType::Episode, episode_id))
            .and_then(|item| Some((item.show_id?, item.season_number?, 1))))
    }
}

/// Candidate source double returning preconfigured artwork maps.
#[derive(Default)]
pub struct FakeSource {
    art: Mutex<HashMap<(MediaType, i64), ArtworkMap>>,
    pub fetch_count: AtomicU32,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_candidates(
        &self,
        media_type: MediaType,
        id: i64,
        art_type: ArtType,
        candidates: Vec<ArtworkCandidate>,
    ) {
        self.art
            .lock()
            .unwrap()
            .entry((media_type, id))
            .or_default()
            .insert(art_type, candidates);
    }
}

#[async_trait]
impl CandidateSource for FakeSource {
    async fn fetch_all(
        &self,
        media_type: MediaType,
        library_id: i64,
        _bypass_cache: bool,
    ) -> artfetch_common::Result<ArtworkMap> {
        self.fetch_count.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .art
            .lock()
            .unwrap()
            .get(&(media_type, library_id))
            .cloned()
            .unwrap_or_default())
    }
}

/// Chooser double replaying a scripted sequence of outcomes.
#[derive(Default)]
pub struct ScriptedChooser {
    outcomes: Mutex<VecDeque<ChooserOutcome>>,
    pub requests: Mutex<Vec<ChooserRequest>>,
}

impl ScriptedChooser {
    pub fn new(outcomes: Vec<ChooserOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtworkChooser for ScriptedChooser {
    async fn present(&self, request: ChooserRequest) -> ChooserOutcome {
        self.requests.lock().unwrap().push(request);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(ChooserOutcome::skip)
    }
}
