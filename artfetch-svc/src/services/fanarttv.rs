//! fanart.tv API client.
//!
//! One request per item returns every art type at once, keyed by
//! provider-specific names. Entries are remapped onto our art types with the
//! provider's documented fixed dimensions attached.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::fetch::{FetchError, FetchResponse, RateLimitedFetcher, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW};
use crate::models::{ArtType, ArtworkCandidate};

const BASE_URL: &str = "https://webservice.fanart.tv/v3";

/// Provider type name, our art type, and the provider's fixed dimensions
/// (None when fanart.tv doesn't document a size for the type).
const MOVIE_TYPE_MAP: &[(&str, ArtType, Option<(u32, u32)>)] = &[
    ("movieposter", ArtType::Poster, None),
    ("moviebackground", ArtType::Fanart, Some((1920, 1080))),
    ("moviebackground4k", ArtType::Fanart, Some((3840, 2160))),
    ("hdmovielogo", ArtType::ClearLogo, Some((800, 310))),
    ("movielogo", ArtType::ClearLogo, Some((400, 155))),
    ("hdmovieclearart", ArtType::ClearArt, Some((1000, 562))),
    ("movieclearart", ArtType::ClearArt, Some((1000, 562))),
    ("moviebanner", ArtType::Banner, Some((1000, 185))),
    ("moviedisc", ArtType::DiscArt, Some((1000, 1000))),
    ("moviethumb", ArtType::Landscape, Some((1000, 562))),
];

const TV_TYPE_MAP: &[(&str, ArtType, Option<(u32, u32)>)] = &[
    ("tvposter", ArtType::Poster, None),
    ("showbackground", ArtType::Fanart, Some((1920, 1080))),
    ("showbackground4k", ArtType::Fanart, Some((3840, 2160))),
    ("hdtvlogo", ArtType::ClearLogo, Some((800, 310))),
    ("clearlogo", ArtType::ClearLogo, Some((400, 155))),
    ("hdclearart", ArtType::ClearArt, Some((1000, 562))),
    ("clearart", ArtType::ClearArt, Some((1000, 562))),
    ("tvbanner", ArtType::Banner, Some((1000, 185))),
    ("tvthumb", ArtType::Landscape, Some((1000, 562))),
    ("characterart", ArtType::CharacterArt, None),
    ("seasonposter", ArtType::Poster, None),
    ("seasonbanner", ArtType::Banner, Some((1000, 185))),
    ("seasonthumb", ArtType::Landscape, Some((1000, 562))),
];

/// Provider types that carry a season tag.
const SEASON_SCOPED_TYPES: &[&str] = &["seasonposter", "seasonbanner", "seasonthumb"];

#[derive(Debug, Deserialize)]
struct FanartEntry {
    #[serde(default)]
    url: String,
    #[serde(default)]
    url_thumb: Option<String>,
    #[serde(default)]
    lang: Option<String>,
    /// fanart.tv serializes likes as a string
    #[serde(default)]
    likes: Option<String>,
    #[serde(default)]
    season: Option<String>,
}

pub struct FanartTvClient {
    fetcher: RateLimitedFetcher,
    api_key: Option<String>,
}

impl FanartTvClient {
    /// Works without a key at reduced service; a personal key lifts limits.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            fetcher: RateLimitedFetcher::new("fanart.tv", DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW),
            api_key,
        }
    }

    async fn fetch(&self, path: &str) -> Result<Option<Value>, FetchError> {
        let url = format!("{}{}", BASE_URL, path);
        let mut headers: Vec<(&str, &str)> = vec![("Accept", "application/json")];
        if let Some(key) = &self.api_key {
            headers.push(("api-key", key.as_str()));
        }

        match self.fetcher.get_json(&url, &headers).await? {
            FetchResponse::NotFound => Ok(None),
            FetchResponse::Json(value) => Ok(Some(value)),
        }
    }

    /// All artwork for a movie, keyed by TMDB id.
    pub async fn movie_artwork(
        &self,
        tmdb_id: u64,
    ) -> Result<HashMap<ArtType, Vec<ArtworkCandidate>>, FetchError> {
        let data = self.fetch(&format!("/movies/{}", tmdb_id)).await?;
        Ok(data
            .map(|data| transform(&data, MOVIE_TYPE_MAP))
            .unwrap_or_default())
    }

    /// All artwork for a TV show; fanart.tv keys shows by TVDB id.
    pub async fn tv_artwork(
        &self,
        tvdb_id: u64,
    ) -> Result<HashMap<ArtType, Vec<ArtworkCandidate>>, FetchError> {
        let data = self.fetch(&format!("/tv/{}", tvdb_id)).await?;
        Ok(data
            .map(|data| transform(&data, TV_TYPE_MAP))
            .unwrap_or_default())
    }

    /// Season-scoped artwork for one season of a show.
    pub async fn season_artwork(
        &self,
        tvdb_id: u64,
        season_number: i32,
    ) -> Result<HashMap<ArtType, Vec<ArtworkCandidate>>, FetchError> {
        let data = self.fetch(&format!("/tv/{}", tvdb_id)).await?;
        let Some(data) = data else {
            return Ok(HashMap::new());
        };

        let season_map: Vec<_> = TV_TYPE_MAP
            .iter()
            .filter(|(name, _, _)| SEASON_SCOPED_TYPES.contains(name))
            .copied()
            .collect();
        let mut result = transform(&data, &season_map);

        let wanted = season_number.to_string();
        for candidates in result.values_mut() {
            candidates.retain(|candidate| {
                candidate
                    .season
                    .as_deref()
                    .map(|s| s == wanted || s == "all")
                    .unwrap_or(false)
            });
        }
        result.retain(|_, candidates| !candidates.is_empty());

        Ok(result)
    }
}

fn transform(
    data: &Value,
    type_map: &[(&str, ArtType, Option<(u32, u32)>)],
) -> HashMap<ArtType, Vec<ArtworkCandidate>> {
    let mut result: HashMap<ArtType, Vec<ArtworkCandidate>> = HashMap::new();

    for (provider_type, art_type, dimensions) in type_map {
        let Some(items) = data.get(provider_type) else {
            continue;
        };
        let Ok(entries) = serde_json::from_value::<Vec<FanartEntry>>(items.clone()) else {
            tracing::warn!(provider_type, "Unexpected fanart.tv payload shape");
            continue;
        };

        for entry in entries {
            if entry.url.is_empty() {
                continue;
            }

            let preview = entry
                .url_thumb
                .clone()
                .unwrap_or_else(|| entry.url.replace("/fanart/", "/preview/"));
            let (width, height) = dimensions.unwrap_or((0, 0));

            result
                .entry(*art_type)
                .or_default()
                .push(ArtworkCandidate {
                    url: entry.url.clone(),
                    preview_url: preview,
                    width,
                    height,
                    rating: 0.0,
                    vote_count: 0,
                    likes: entry
                        .likes
                        .as_deref()
                        .and_then(|l| l.parse().ok())
                        .unwrap_or(0),
                    language: entry.lang.clone().unwrap_or_default(),
                    source: "fanart.tv".to_string(),
                    season: entry.season.clone(),
                });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_movie() -> Value {
        json!({
            "name": "Arrival",
            "movieposter": [
                {"id": "1", "url": "https://assets.fanart.tv/fanart/movies/1/movieposter/a.jpg",
                 "lang": "en", "likes": "7"}
            ],
            "moviebackground": [
                {"id": "2", "url": "https://assets.fanart.tv/fanart/movies/1/moviebackground/b.jpg",
                 "lang": "", "likes": "12"}
            ],
            "hdmovielogo": [
                {"id": "3", "url": "https://assets.fanart.tv/fanart/movies/1/hdmovielogo/c.png",
                 "lang": "en", "likes": "3"}
            ]
        })
    }

    #[test]
    fn test_transform_maps_provider_types() {
        let result = transform(&sample_movie(), MOVIE_TYPE_MAP);

        assert_eq!(result[&ArtType::Poster].len(), 1);
        assert_eq!(result[&ArtType::Fanart].len(), 1);
        assert_eq!(result[&ArtType::ClearLogo].len(), 1);

        let background = &result[&ArtType::Fanart][0];
        assert_eq!(background.likes, 12);
        assert_eq!((background.width, background.height), (1920, 1080));
        assert_eq!(background.source, "fanart.tv");
        // Preview derived from the fanart path.
        assert!(background.preview_url.contains("/preview/"));
    }

    #[test]
    fn test_season_filter_keeps_matching_and_all() {
        let data = json!({
            "seasonposter": [
                {"id": "1", "url": "https://assets.fanart.tv/fanart/a.jpg", "season": "1", "likes": "5"},
                {"id": "2", "url": "https://assets.fanart.tv/fanart/b.jpg", "season": "2", "likes": "9"},
                {"id": "3", "url": "https://assets.fanart.tv/fanart/c.jpg", "season": "all", "likes": "2"}
            ]
        });

        let season_map: Vec<_> = TV_TYPE_MAP
            .iter()
            .filter(|(name, _, _)| SEASON_SCOPED_TYPES.contains(name))
            .copied()
            .collect();
        let mut result = transform(&data, &season_map);
        for candidates in result.values_mut() {
            candidates.retain(|c| {
                c.season.as_deref().map(|s| s == "1" || s == "all").unwrap_or(false)
            });
        }

        let posters = &result[&ArtType::Poster];
        assert_eq!(posters.len(), 2);
    }
}
