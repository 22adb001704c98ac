//! TMDB API client for artwork.
//!
//! One multi-type images request per item; responses are normalized into
//! [`ArtworkCandidate`] lists keyed by art type.

use serde::Deserialize;
use std::collections::HashMap;

use super::fetch::{FetchError, FetchResponse, RateLimitedFetcher, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
use crate::models::{normalize_language_tag, ArtType, ArtworkCandidate, MediaType};

const BASE_URL: &str = "https://api.themoviedb.org/3";
const IMAGE_BASE: &str = "https://image.tmdb.org/t/p";

/// TMDB images payload for one movie or show.
#[derive(Debug, Deserialize)]
struct TmdbImages {
    #[serde(default)]
    posters: Vec<TmdbImage>,
    #[serde(default)]
    backdrops: Vec<TmdbImage>,
    #[serde(default)]
    logos: Vec<TmdbImage>,
    #[serde(default)]
    stills: Vec<TmdbImage>,
}

#[derive(Debug, Deserialize)]
struct TmdbImage {
    file_path: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    vote_average: f64,
    #[serde(default)]
    vote_count: u32,
    iso_639_1: Option<String>,
}

pub struct TmdbClient {
    fetcher: RateLimitedFetcher,
    api_key: String,
    /// User's metadata language, used to order backdrops
    preferred_language: String,
}

impl TmdbClient {
    pub fn new(api_key: String, preferred_language: String) -> Self {
        Self {
            fetcher: RateLimitedFetcher::new("TMDB", DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW),
            api_key,
            preferred_language: normalize_language_tag(Some(&preferred_language)),
        }
    }

    async fn fetch_images(&self, path: &str) -> Result<Option<TmdbImages>, FetchError> {
        let url = format!("{}{}?api_key={}", BASE_URL, path, self.api_key);
        let headers = [("Accept", "application/json")];

        match self.fetcher.get_json(&url, &headers).await? {
            FetchResponse::NotFound => Ok(None),
            FetchResponse::Json(value) => match serde_json::from_value::<TmdbImages>(value) {
                Ok(images) => Ok(Some(images)),
                Err(e) => Err(FetchError::Network {
                    service: "TMDB".to_string(),
                    message: format!("unexpected payload: {}", e),
                }),
            },
        }
    }

    /// All artwork for a movie or TV show, one request.
    pub async fn images(
        &self,
        media_type: MediaType,
        tmdb_id: u64,
    ) -> Result<HashMap<ArtType, Vec<ArtworkCandidate>>, FetchError> {
        let kind = match media_type {
            MediaType::TvShow => "tv",
            _ => "movie",
        };
        let images = self
            .fetch_images(&format!("/{}/{}/images", kind, tmdb_id))
            .await?;

        Ok(images
            .map(|images| self.transform(images))
            .unwrap_or_default())
    }

    /// Season posters for one show season.
    pub async fn season_images(
        &self,
        tmdb_id: u64,
        season_number: i32,
    ) -> Result<HashMap<ArtType, Vec<ArtworkCandidate>>, FetchError> {
        let images = self
            .fetch_images(&format!("/tv/{}/season/{}/images", tmdb_id, season_number))
            .await?;

        let mut result = HashMap::new();
        if let Some(images) = images {
            let posters: Vec<_> = images
                .posters
                .iter()
                .filter_map(|image| format_image(image, "w500"))
                .collect();
            if !posters.is_empty() {
                result.insert(ArtType::Poster, posters);
            }
        }
        Ok(result)
    }

    /// Episode stills, mapped to the thumb slot.
    pub async fn episode_images(
        &self,
        tmdb_id: u64,
        season_number: i32,
        episode_number: i32,
    ) -> Result<HashMap<ArtType, Vec<ArtworkCandidate>>, FetchError> {
        let images = self
            .fetch_images(&format!(
                "/tv/{}/season/{}/episode/{}/images",
                tmdb_id, season_number, episode_number
            ))
            .await?;

        let mut result = HashMap::new();
        if let Some(images) = images {
            let stills: Vec<_> = images
                .stills
                .iter()
                .filter_map(|image| format_image(image, "w780"))
                .collect();
            if !stills.is_empty() {
                result.insert(ArtType::Thumb, stills);
            }
        }
        Ok(result)
    }

    fn transform(&self, images: TmdbImages) -> HashMap<ArtType, Vec<ArtworkCandidate>> {
        let mut result: HashMap<ArtType, Vec<ArtworkCandidate>> = HashMap::new();

        let posters: Vec<_> = images
            .posters
            .iter()
            .filter_map(|image| format_image(image, "w500"))
            .collect();
        if !posters.is_empty() {
            result.insert(ArtType::Poster, posters);
        }

        let logos: Vec<_> = images
            .logos
            .iter()
            .filter_map(|image| format_image(image, "w500"))
            .collect();
        if !logos.is_empty() {
            result.insert(ArtType::ClearLogo, logos);
        }

        // Backdrops feed both fanart and landscape, ordered so the user's
        // language comes first, then English, then text-free, then the rest.
        let mut backdrops: Vec<_> = images
            .backdrops
            .iter()
            .filter_map(|image| format_image(image, "w780"))
            .collect();
        backdrops.sort_by_key(|candidate| self.backdrop_language_tier(&candidate.language));

        if !backdrops.is_empty() {
            result.insert(ArtType::Fanart, backdrops.clone());
            result.insert(ArtType::Landscape, backdrops);
        }

        result
    }

    fn backdrop_language_tier(&self, language: &str) -> (u8, String) {
        let lang = normalize_language_tag(Some(language));
        if !self.preferred_language.is_empty() && lang == self.preferred_language {
            (0, String::new())
        } else if lang == "en" && self.preferred_language != "en" {
            (1, String::new())
        } else if lang.is_empty() {
            (2, String::new())
        } else {
            (3, lang)
        }
    }
}

fn format_image(image: &TmdbImage, preview_size: &str) -> Option<ArtworkCandidate> {
    if image.file_path.is_empty() {
        return None;
    }

    // The library cannot render SVG logos.
    if image.file_path.to_lowercase().ends_with(".svg") {
        return None;
    }

    Some(ArtworkCandidate {
        url: format!("{}/original{}", IMAGE_BASE, image.file_path),
        preview_url: format!("{}/{}{}", IMAGE_BASE, preview_size, image.file_path),
        width: image.width,
        height: image.height,
        rating: image.vote_average,
        vote_count: image.vote_count,
        likes: 0,
        language: image.iso_639_1.clone().unwrap_or_default(),
        source: "tmdb".to_string(),
        season: None,
    })
}
