//! JSON-RPC client for the host media library.
//!
//! Speaks the library's request/response envelope over HTTP POST. Method
//! names follow the library's `Video.*`/`Textures.*` namespaces; responses
//! are picked apart leniently since older library versions omit fields.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use super::{LibraryError, LibraryItem, MediaLibrary};
use crate::models::{ArtType, ExternalIds, MediaType};

pub struct RpcMediaLibrary {
    client: reqwest::Client,
    endpoint: String,
}

impl RpcMediaLibrary {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, LibraryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LibraryError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LibraryError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        tracing::debug!(method, "Library RPC call");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| LibraryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LibraryError::Transport(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| LibraryError::Transport(e.to_string()))?;

        if let Some(error) = envelope.get("error") {
            return Err(LibraryError::Rejected(error.to_string()));
        }

        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    fn list_method(media_type: MediaType) -> (&'static str, &'static str) {
        match media_type {
            MediaType::Movie => ("Video.GetMovies", "movies"),
            MediaType::TvShow => ("Video.GetTvShows", "tvshows"),
            MediaType::Season => ("Video.GetSeasons", "seasons"),
            MediaType::Episode => ("Video.GetEpisodes", "episodes"),
            MediaType::MusicVideo => ("Video.GetMusicVideos", "musicvideos"),
        }
    }

    fn details_method(media_type: MediaType) -> (&'static str, &'static str, &'static str) {
        match media_type {
            MediaType::Movie => ("Video.GetMovieDetails", "movieid", "moviedetails"),
            MediaType::TvShow => ("Video.GetTvShowDetails", "tvshowid", "tvshowdetails"),
            MediaType::Season => ("Video.GetSeasonDetails", "seasonid", "seasondetails"),
            MediaType::Episode => ("Video.GetEpisodeDetails", "episodeid", "episodedetails"),
            MediaType::MusicVideo => (
                "Video.GetMusicVideoDetails",
                "musicvideoid",
                "musicvideodetails",
            ),
        }
    }

    fn set_art_method(media_type: MediaType) -> (&'static str, &'static str) {
        match media_type {
            MediaType::Movie => ("Video.SetMovieDetails", "movieid"),
            MediaType::TvShow => ("Video.SetTvShowDetails", "tvshowid"),
            MediaType::Season => ("Video.SetSeasonDetails", "seasonid"),
            MediaType::Episode => ("Video.SetEpisodeDetails", "episodeid"),
            MediaType::MusicVideo => ("Video.SetMusicVideoDetails", "musicvideoid"),
        }
    }

    fn parse_art_map(value: Option<&Value>) -> HashMap<ArtType, String> {
        let mut art = HashMap::new();
        if let Some(Value::Object(map)) = value {
            for (key, url) in map {
                if let (Ok(art_type), Some(url)) = (key.parse::<ArtType>(), url.as_str()) {
                    if !url.is_empty() {
                        art.insert(art_type, url.to_string());
                    }
                }
            }
        }
        art
    }

    fn parse_item(media_type: MediaType, value: &Value) -> Option<LibraryItem> {
        let id_key = match media_type {
            MediaType::Movie => "movieid",
            MediaType::TvShow => "tvshowid",
            MediaType::Season => "seasonid",
            MediaType::Episode => "episodeid",
            MediaType::MusicVideo => "musicvideoid",
        };
        let id = value.get(id_key)?.as_i64()?;

        Some(LibraryItem {
            id,
            media_type,
            title: value
                .get("title")
                .or_else(|| value.get("label"))
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
            year: value.get("year").and_then(Value::as_i64).map(|y| y as i32),
            art: Self::parse_art_map(value.get("art")),
            show_id: value.get("tvshowid").and_then(Value::as_i64),
            season_number: value
                .get("season")
                .and_then(Value::as_i64)
                .map(|s| s as i32),
        })
    }
}

#[async_trait]
impl MediaLibrary for RpcMediaLibrary {
    async fn list_items(&self, media_type: MediaType) -> Result<Vec<LibraryItem>, LibraryError> {
        let (method, result_key) = Self::list_method(media_type);
        let result = self
            .call(
                method,
                json!({"properties": ["title", "year", "art", "season", "tvshowid"]}),
            )
            .await?;

        let items = result
            .get(result_key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(items
            .iter()
            .filter_map(|value| Self::parse_item(media_type, value))
            .collect())
    }

    async fn get_item(
        &self,
        media_type: MediaType,
        id: i64,
    ) -> Result<Option<LibraryItem>, LibraryError> {
        let (method, id_key, result_key) = Self::details_method(media_type);
        let result = self
            .call(
                method,
                json!({id_key: id, "properties": ["title", "year", "art", "season", "tvshowid"]}),
            )
            .await?;

        let Some(details) = result.get(result_key) else {
            return Ok(None);
        };

        let mut value = details.clone();
        // Detail payloads omit the id field; splice it back for the parser.
        if let Value::Object(map) = &mut value {
            let id_key = match media_type {
                MediaType::Movie => "movieid",
                MediaType::TvShow => "tvshowid",
                MediaType::Season => "seasonid",
                MediaType::Episode => "episodeid",
                MediaType::MusicVideo => "musicvideoid",
            };
            map.entry(id_key.to_string()).or_insert(json!(id));
        }

        Ok(Self::parse_item(media_type, &value))
    }

    async fn season_info(&self, season_id: i64) -> Result<Option<(i64, i32)>, LibraryError> {
        let result = self
            .call(
                "Video.GetSeasonDetails",
                json!({"seasonid": season_id, "properties": ["season", "tvshowid"]}),
            )
            .await?;

        let Some(details) = result.get("seasondetails") else {
            return Ok(None);
        };

        let show_id = details.get("tvshowid").and_then(Value::as_i64);
        let season = details.get("season").and_then(Value::as_i64);
        Ok(match (show_id, season) {
            (Some(show_id), Some(season)) => Some((show_id, season as i32)),
            _ => None,
        })
    }

    async fn episode_info(
        &self,
        episode_id: i64,
    ) -> Result<Option<(i64, i32, i32)>, LibraryError> {
        let result = self
            .call(
                "Video.GetEpisodeDetails",
                json!({"episodeid": episode_id, "properties": ["season", "episode", "tvshowid"]}),
            )
            .await?;

        let Some(details) = result.get("episodedetails") else {
            return Ok(None);
        };

        let show_id = details.get("tvshowid").and_then(Value::as_i64);
        let season = details.get("season").and_then(Value::as_i64);
        let episode = details.get("episode").and_then(Value::as_i64);
        Ok(match (show_id, season, episode) {
            (Some(show_id), Some(season), Some(episode)) => {
                Some((show_id, season as i32, episode as i32))
            }
            _ => None,
        })
    }

    async fn item_art(
        &self,
        media_type: MediaType,
        id: i64,
    ) -> Result<HashMap<ArtType, String>, LibraryError> {
        let (method, id_key, result_key) = Self::details_method(media_type);
        let result = self
            .call(method, json!({id_key: id, "properties": ["art"]}))
            .await?;

        let details = result
            .get(result_key)
            .ok_or(LibraryError::NotFound { media_type, id })?;

        Ok(Self::parse_art_map(details.get("art")))
    }

    async fn set_item_art(
        &self,
        media_type: MediaType,
        id: i64,
        updates: &HashMap<String, String>,
    ) -> Result<(), LibraryError> {
        let (method, id_key) = Self::set_art_method(media_type);
        self.call(method, json!({id_key: id, "art": updates})).await?;
        Ok(())
    }

    async fn external_ids(
        &self,
        media_type: MediaType,
        id: i64,
    ) -> Result<ExternalIds, LibraryError> {
        let (method, id_key, result_key) = Self::details_method(media_type);
        let properties = match media_type {
            MediaType::Episode => json!(["uniqueid", "firstaired", "season", "tvshowid"]),
            MediaType::Season => json!(["uniqueid", "season", "tvshowid"]),
            _ => json!(["uniqueid", "premiered"]),
        };

        let result = self
            .call(method, json!({id_key: id, "properties": properties}))
            .await?;
        let details = result
            .get(result_key)
            .ok_or(LibraryError::NotFound { media_type, id })?;

        let unique_ids = details.get("uniqueid");
        let parse_id = |key: &str| -> Option<u64> {
            unique_ids
                .and_then(|ids| ids.get(key))
                .and_then(|v| match v {
                    Value::String(s) => s.parse().ok(),
                    Value::Number(n) => n.as_u64(),
                    _ => None,
                })
        };

        Ok(ExternalIds {
            tmdb_id: parse_id("tmdb"),
            tvdb_id: parse_id("tvdb"),
            premiered: details
                .get("premiered")
                .or_else(|| details.get("firstaired"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }

    async fn texture_dimensions(&self, url: &str) -> Result<Option<(u32, u32)>, LibraryError> {
        let result = self
            .call("Textures.GetDimensions", json!({"url": url}))
            .await?;

        let width = result.get("width").and_then(Value::as_u64);
        let height = result.get("height").and_then(Value::as_u64);

        match (width, height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Ok(Some((w as u32, h as u32))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item_reads_art_map() {
        let value = json!({
            "movieid": 42,
            "title": "Arrival",
            "year": 2016,
            "art": {"poster": "http://img/p.jpg", "fanart": "", "unknowntype": "x"}
        });

        let item = RpcMediaLibrary::parse_item(MediaType::Movie, &value).unwrap();
        assert_eq!(item.id, 42);
        assert_eq!(item.title, "Arrival");
        assert_eq!(item.year, Some(2016));
        // Empty URLs and unknown slots are dropped.
        assert_eq!(item.art.len(), 1);
        assert_eq!(item.art[&ArtType::Poster], "http://img/p.jpg");
    }

    #[test]
    fn test_parse_item_without_id_is_skipped() {
        let value = json!({"title": "No id"});
        assert!(RpcMediaLibrary::parse_item(MediaType::Movie, &value).is_none());
    }
}
