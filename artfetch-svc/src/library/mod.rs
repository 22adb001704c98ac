//! Media library boundary.
//!
//! The host library is an external collaborator reached over a
//! request/response RPC interface. The pipeline only depends on this trait;
//! production uses the JSON-RPC client in [`rpc`], tests use in-memory
//! fakes.

pub mod rpc;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{ArtType, ExternalIds, MediaType};

pub use rpc::RpcMediaLibrary;

/// Errors crossing the library boundary.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Library transport error: {0}")]
    Transport(String),

    #[error("Library item not found: {media_type}:{id}")]
    NotFound { media_type: MediaType, id: i64 },

    #[error("Library rejected request: {0}")]
    Rejected(String),
}

/// One item as listed by the library.
#[derive(Debug, Clone)]
pub struct LibraryItem {
    pub id: i64,
    pub media_type: MediaType,
    pub title: String,
    pub year: Option<i32>,
    /// Current artwork map (slot name to URL)
    pub art: HashMap<ArtType, String>,
    /// Parent show id for seasons/episodes
    pub show_id: Option<i64>,
    /// Season number for seasons/episodes
    pub season_number: Option<i32>,
}

/// Queryable/mutable catalog of media items with a key-value art map per
/// item.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// List all items of a media type with title/year/art populated.
    async fn list_items(&self, media_type: MediaType) -> Result<Vec<LibraryItem>, LibraryError>;

    /// Fetch one item with title/year/art, or None when it no longer exists.
    async fn get_item(
        &self,
        media_type: MediaType,
        id: i64,
    ) -> Result<Option<LibraryItem>, LibraryError>;

    /// Owning show id and season number for a season row.
    async fn season_info(&self, season_id: i64) -> Result<Option<(i64, i32)>, LibraryError>;

    /// Owning show id, season number and episode number for an episode row.
    async fn episode_info(&self, episode_id: i64)
        -> Result<Option<(i64, i32, i32)>, LibraryError>;

    /// Current artwork map for one item. Live state, not a snapshot.
    async fn item_art(
        &self,
        media_type: MediaType,
        id: i64,
    ) -> Result<HashMap<ArtType, String>, LibraryError>;

    /// Apply artwork updates to one item. Applying the same URL twice is a
    /// no-op on the library side.
    async fn set_item_art(
        &self,
        media_type: MediaType,
        id: i64,
        updates: &HashMap<String, String>,
    ) -> Result<(), LibraryError>;

    /// External provider ids and premiere date for an item.
    async fn external_ids(
        &self,
        media_type: MediaType,
        id: i64,
    ) -> Result<ExternalIds, LibraryError>;

    /// True pixel dimensions of a texture the library has already cached,
    /// if it has them.
    async fn texture_dimensions(&self, url: &str) -> Result<Option<(u32, u32)>, LibraryError>;
}
