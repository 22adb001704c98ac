//! Artwork candidate and media type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Library media types handled by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Movie,
    TvShow,
    Season,
    Episode,
    MusicVideo,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::TvShow => "tvshow",
            MediaType::Season => "season",
            MediaType::Episode => "episode",
            MediaType::MusicVideo => "musicvideo",
        }
    }

    /// Art types checked for this media type when no override is configured.
    pub fn default_art_types(&self) -> Vec<ArtType> {
        use ArtType::*;
        match self {
            MediaType::Movie => vec![
                Poster, Fanart, ClearLogo, ClearArt, Banner, Landscape, DiscArt, KeyArt,
            ],
            MediaType::TvShow => vec![
                Poster, Fanart, ClearLogo, ClearArt, Banner, Landscape, CharacterArt,
            ],
            MediaType::Season => vec![Poster, Banner, Landscape, Fanart],
            MediaType::Episode => vec![Thumb],
            MediaType::MusicVideo => vec![
                Poster, Fanart, ClearLogo, ClearArt, Banner, Landscape, KeyArt,
            ],
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(MediaType::Movie),
            "tvshow" => Ok(MediaType::TvShow),
            "season" => Ok(MediaType::Season),
            "episode" => Ok(MediaType::Episode),
            "musicvideo" => Ok(MediaType::MusicVideo),
            other => Err(format!("unknown media type: {}", other)),
        }
    }
}

/// Named artwork slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtType {
    Poster,
    Fanart,
    #[serde(rename = "clearlogo")]
    ClearLogo,
    #[serde(rename = "clearart")]
    ClearArt,
    Banner,
    Landscape,
    #[serde(rename = "characterart")]
    CharacterArt,
    #[serde(rename = "discart")]
    DiscArt,
    #[serde(rename = "keyart")]
    KeyArt,
    Thumb,
}

impl ArtType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtType::Poster => "poster",
            ArtType::Fanart => "fanart",
            ArtType::ClearLogo => "clearlogo",
            ArtType::ClearArt => "clearart",
            ArtType::Banner => "banner",
            ArtType::Landscape => "landscape",
            ArtType::CharacterArt => "characterart",
            ArtType::DiscArt => "discart",
            ArtType::KeyArt => "keyart",
            ArtType::Thumb => "thumb",
        }
    }

    /// Review ordering so the chooser always presents slots in the same
    /// sequence for one item.
    pub fn review_priority(&self) -> u8 {
        match self {
            ArtType::Poster => 1,
            ArtType::Fanart => 2,
            ArtType::ClearLogo => 3,
            ArtType::ClearArt => 4,
            ArtType::Banner => 5,
            ArtType::Landscape => 6,
            ArtType::CharacterArt => 7,
            ArtType::DiscArt => 8,
            ArtType::KeyArt => 9,
            ArtType::Thumb => 10,
        }
    }

    /// Fallback dimensions assumed when a source reports none.
    pub fn default_dimensions(&self) -> (u32, u32) {
        match self {
            ArtType::Poster => (1000, 1426),
            ArtType::Fanart => (1920, 1080),
            ArtType::ClearArt => (1000, 562),
            ArtType::Landscape => (1000, 562),
            ArtType::Banner => (1000, 185),
            ArtType::DiscArt => (1000, 1000),
            ArtType::ClearLogo => (800, 310),
            ArtType::CharacterArt => (1000, 1399),
            ArtType::KeyArt => (1000, 1426),
            ArtType::Thumb => (1280, 720),
        }
    }

    /// True when auto-apply only accepts text-free candidates for this slot.
    pub fn is_language_free(&self) -> bool {
        matches!(self, ArtType::Fanart | ArtType::KeyArt)
    }

    /// True when auto-apply requires the preferred language for this slot.
    pub fn requires_language(&self) -> bool {
        matches!(
            self,
            ArtType::Poster
                | ArtType::ClearLogo
                | ArtType::ClearArt
                | ArtType::Banner
                | ArtType::CharacterArt
                | ArtType::DiscArt
                | ArtType::Landscape
        )
    }
}

impl fmt::Display for ArtType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "poster" => Ok(ArtType::Poster),
            "fanart" => Ok(ArtType::Fanart),
            "clearlogo" => Ok(ArtType::ClearLogo),
            "clearart" => Ok(ArtType::ClearArt),
            "banner" => Ok(ArtType::Banner),
            "landscape" => Ok(ArtType::Landscape),
            "characterart" => Ok(ArtType::CharacterArt),
            "discart" => Ok(ArtType::DiscArt),
            "keyart" => Ok(ArtType::KeyArt),
            "thumb" => Ok(ArtType::Thumb),
            other => Err(format!("unknown art type: {}", other)),
        }
    }
}

/// One artwork option offered by a provider, normalized across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtworkCandidate {
    /// Full-resolution image URL
    pub url: String,
    /// Smaller preview URL for dialogs
    pub preview_url: String,
    /// Pixel width (0 when the source reports none, backfilled on finalize)
    #[serde(default)]
    pub width: u32,
    /// Pixel height
    #[serde(default)]
    pub height: u32,
    /// Source rating, e.g. TMDB vote_average
    #[serde(default)]
    pub rating: f64,
    /// Number of votes behind the rating
    #[serde(default)]
    pub vote_count: u32,
    /// fanart.tv style likes counter
    #[serde(default)]
    pub likes: u32,
    /// ISO 639-1 language tag, empty for text-free art
    #[serde(default)]
    pub language: String,
    /// Provider name ("tmdb" or "fanart.tv")
    pub source: String,
    /// Season tag for season-scoped fanart.tv art ("all" or a number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
}

impl ArtworkCandidate {
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// External provider ids resolved from the library for one item.
#[derive(Debug, Clone, Default)]
pub struct ExternalIds {
    pub tmdb_id: Option<u64>,
    pub tvdb_id: Option<u64>,
    /// Release/premiere date in YYYY-MM-DD, used for cache TTL tiers
    pub premiered: Option<String>,
}

/// Candidate sort modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Language tier, then weighted popularity, then resolution
    Popularity,
    /// Pixel count only
    Resolution,
}

/// Source restriction for ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePreference {
    All,
    Tmdb,
    Fanart,
}

/// Normalize a language tag: trim, lowercase, strip region suffix, and map
/// the "none" markers providers use ("xx", "00") to empty.
pub fn normalize_language_tag(tag: Option<&str>) -> String {
    let tag = tag.unwrap_or("").trim().to_lowercase();
    let base = tag.split('-').next().unwrap_or("").to_string();
    match base.as_str() {
        "xx" | "00" | "none" => String::new(),
        _ => base,
    }
}
