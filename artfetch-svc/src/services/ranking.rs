//! Candidate quality ranking and language policy filters.
//!
//! Pure functions: output order depends only on the inputs and the
//! documented tie-breaks (the sorts are stable).

use std::cmp::Ordering;

use crate::models::{
    normalize_language_tag, ArtType, ArtworkCandidate, SortMode, SourcePreference,
};

/// Bayesian smoothing priors. Three phantom votes at an average-quality
/// rating keep a single 10/10 vote from outranking well-reviewed art.
const BAYESIAN_M: f64 = 3.0;
const BAYESIAN_C: f64 = 2.3;

/// Scale factor mapping fanart.tv likes onto the rating range.
const LIKES_SCALE: f64 = 0.73;

/// Language preference for candidate filtering and ranking.
#[derive(Debug, Clone)]
pub struct LanguagePolicy {
    /// Preferred ISO 639-1 code, already normalized; empty disables matching
    pub preferred: String,
    /// When set, fanart slots honor the language preference instead of
    /// defaulting to text-free art
    pub prefer_fanart_language: bool,
}

impl LanguagePolicy {
    pub fn new(preferred: &str, prefer_fanart_language: bool) -> Self {
        Self {
            preferred: normalize_language_tag(Some(preferred)),
            prefer_fanart_language,
        }
    }
}

impl Default for LanguagePolicy {
    fn default() -> Self {
        Self::new("en", false)
    }
}

/// Provider-agnostic popularity score.
///
/// Rated candidates get a Bayesian-smoothed average; likes-only candidates
/// are scaled onto the same range; candidates with no vote signal at all sit
/// at the neutral prior.
pub fn popularity_score(candidate: &ArtworkCandidate) -> f64 {
    if candidate.rating > 0.0 {
        let votes = candidate.vote_count as f64;
        (votes / (votes + BAYESIAN_M)) * candidate.rating
            + (BAYESIAN_M / (votes + BAYESIAN_M)) * BAYESIAN_C
    } else if candidate.likes > 0 {
        candidate.likes as f64 * LIKES_SCALE
    } else if candidate.vote_count == 0 {
        BAYESIAN_C
    } else {
        0.0
    }
}

fn language_tier(candidate: &ArtworkCandidate, preferred: &str) -> u8 {
    let language = normalize_language_tag(Some(&candidate.language));
    if !preferred.is_empty() && language == preferred {
        0
    } else if language.is_empty() {
        1
    } else {
        2
    }
}

/// Rank candidates for one art type.
///
/// Steps: restrict by source preference, then order by the sort mode:
/// resolution mode is pixel count only; popularity mode is language tier
/// (when the preference applies to this art type), weighted popularity,
/// pixel count.
pub fn rank(
    candidates: &[ArtworkCandidate],
    art_type: ArtType,
    sort_mode: SortMode,
    source_pref: SourcePreference,
    policy: &LanguagePolicy,
) -> Vec<ArtworkCandidate> {
    let mut filtered: Vec<ArtworkCandidate> = candidates
        .iter()
        .filter(|candidate| match source_pref {
            SourcePreference::All => true,
            SourcePreference::Tmdb => candidate.source.eq_ignore_ascii_case("tmdb"),
            SourcePreference::Fanart => {
                let source = candidate.source.to_lowercase();
                source == "fanart.tv" || source == "fanarttv"
            }
        })
        .cloned()
        .collect();

    if filtered.len() <= 1 {
        return filtered;
    }

    // Language preference does not apply to fanart backgrounds by default.
    let use_language = !(art_type == ArtType::Fanart && !policy.prefer_fanart_language);

    match sort_mode {
        SortMode::Resolution => {
            filtered.sort_by(|a, b| b.pixels().cmp(&a.pixels()));
        }
        SortMode::Popularity => {
            filtered.sort_by(|a, b| {
                let tier_a = if use_language {
                    language_tier(a, &policy.preferred)
                } else {
                    0
                };
                let tier_b = if use_language {
                    language_tier(b, &policy.preferred)
                } else {
                    0
                };

                tier_a
                    .cmp(&tier_b)
                    .then_with(|| {
                        popularity_score(b)
                            .total_cmp(&popularity_score(a))
                    })
                    .then_with(|| b.pixels().cmp(&a.pixels()))
            });
        }
    }

    filtered
}

fn language_of(candidate: &ArtworkCandidate) -> String {
    normalize_language_tag(Some(&candidate.language))
}

/// Filter the options shown to a reviewer for one art type.
///
/// Language-free slots show only text-free art (unless the fanart language
/// preference is enabled); language-required slots show the preferred
/// language, falling back to everything when nothing matches.
pub fn filter_for_review(
    candidates: &[ArtworkCandidate],
    art_type: ArtType,
    policy: &LanguagePolicy,
) -> Vec<ArtworkCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    if art_type == ArtType::Fanart && policy.prefer_fanart_language {
        if policy.preferred.is_empty() {
            return candidates.to_vec();
        }
        let filtered: Vec<_> = candidates
            .iter()
            .filter(|c| {
                let lang = language_of(c);
                lang == policy.preferred || lang.is_empty()
            })
            .cloned()
            .collect();
        return if filtered.is_empty() {
            candidates.to_vec()
        } else {
            filtered
        };
    }

    if art_type.is_language_free() {
        return candidates
            .iter()
            .filter(|c| language_of(c).is_empty())
            .cloned()
            .collect();
    }

    if art_type.requires_language() && !policy.preferred.is_empty() {
        let filtered: Vec<_> = candidates
            .iter()
            .filter(|c| language_of(c) == policy.preferred)
            .cloned()
            .collect();
        return if filtered.is_empty() {
            candidates.to_vec()
        } else {
            filtered
        };
    }

    candidates
        .iter()
        .filter(|c| {
            let lang = language_of(c);
            lang == policy.preferred || lang.is_empty()
        })
        .cloned()
        .collect()
}

/// Filter candidates for unattended auto-apply.
///
/// Stricter than review filtering on language-free slots: with no text-free
/// candidate the slot is policy-blocked and left for a human. Language-
/// required slots fall back to the unfiltered list when nothing matches the
/// preferred language.
pub fn filter_for_auto_apply(
    candidates: &[ArtworkCandidate],
    art_type: ArtType,
    policy: &LanguagePolicy,
) -> Vec<ArtworkCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    if art_type.is_language_free() {
        return candidates
            .iter()
            .filter(|c| language_of(c).is_empty())
            .cloned()
            .collect();
    }

    if art_type.requires_language() && !policy.preferred.is_empty() {
        let filtered: Vec<_> = candidates
            .iter()
            .filter(|c| language_of(c) == policy.preferred)
            .cloned()
            .collect();
        return if filtered.is_empty() {
            candidates.to_vec()
        } else {
            filtered
        };
    }

    candidates.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(url: &str) -> ArtworkCandidate {
        ArtworkCandidate {
            url: url.to_string(),
            preview_url: String::new(),
            width: 1000,
            height: 1500,
            rating: 0.0,
            vote_count: 0,
            likes: 0,
            language: "en".to_string(),
            source: "tmdb".to_string(),
            season: None,
        }
    }

    #[test]
    fn test_bayesian_prevents_single_vote_dominance() {
        let mut lucky = candidate("lucky");
        lucky.rating = 9.0;
        lucky.vote_count = 1;

        let mut solid = candidate("solid");
        solid.rating = 8.0;
        solid.vote_count = 500;

        let ranked = rank(
            &[lucky, solid],
            ArtType::Poster,
            SortMode::Popularity,
            SourcePreference::All,
            &LanguagePolicy::default(),
        );

        assert_eq!(ranked[0].url, "solid");
        assert_eq!(ranked[1].url, "lucky");
    }

    #[test]
    fn test_resolution_mode_ignores_popularity() {
        let mut small_popular = candidate("small");
        small_popular.rating = 9.9;
        small_popular.vote_count = 1000;
        small_popular.width = 500;
        small_popular.height = 750;

        let mut big_unrated = candidate("big");
        big_unrated.width = 2000;
        big_unrated.height = 3000;

        let ranked = rank(
            &[small_popular, big_unrated],
            ArtType::Poster,
            SortMode::Resolution,
            SourcePreference::All,
            &LanguagePolicy::default(),
        );

        assert_eq!(ranked[0].url, "big");
    }

    #[test]
    fn test_language_tier_orders_preferred_first() {
        let mut german = candidate("de");
        german.language = "de".to_string();
        german.rating = 9.0;
        german.vote_count = 100;

        let mut english = candidate("en");
        english.rating = 5.0;
        english.vote_count = 100;

        let mut untagged = candidate("none");
        untagged.language = String::new();
        untagged.rating = 9.0;
        untagged.vote_count = 100;

        let ranked = rank(
            &[german, english.clone(), untagged],
            ArtType::Poster,
            SortMode::Popularity,
            SourcePreference::All,
            &LanguagePolicy::default(),
        );

        assert_eq!(ranked[0].url, "en");
        assert_eq!(ranked[1].url, "none");
        assert_eq!(ranked[2].url, "de");
    }

    #[test]
    fn test_fanart_ignores_language_tier_by_default() {
        let mut tagged = candidate("tagged");
        tagged.language = "de".to_string();
        tagged.rating = 9.0;
        tagged.vote_count = 100;

        let mut untagged = candidate("untagged");
        untagged.language = String::new();
        untagged.rating = 5.0;
        untagged.vote_count = 100;

        let ranked = rank(
            &[untagged, tagged],
            ArtType::Fanart,
            SortMode::Popularity,
            SourcePreference::All,
            &LanguagePolicy::default(),
        );

        // Popularity decides directly, tier is disabled for fanart.
        assert_eq!(ranked[0].url, "tagged");
    }

    #[test]
    fn test_rank_is_stable_for_equal_keys() {
        let a = candidate("first");
        let b = candidate("second");
        let c = candidate("third");

        let ranked = rank(
            &[a, b, c],
            ArtType::Poster,
            SortMode::Popularity,
            SourcePreference::All,
            &LanguagePolicy::default(),
        );

        assert_eq!(ranked[0].url, "first");
        assert_eq!(ranked[1].url, "second");
        assert_eq!(ranked[2].url, "third");

        // Ranking again yields the identical order.
        let again = rank(
            &ranked,
            ArtType::Poster,
            SortMode::Popularity,
            SourcePreference::All,
            &LanguagePolicy::default(),
        );
        let urls: Vec<_> = again.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_source_preference_restricts() {
        let tmdb = candidate("tmdb-item");
        let mut fanart = candidate("fanart-item");
        fanart.source = "fanart.tv".to_string();

        let ranked = rank(
            &[tmdb, fanart],
            ArtType::Poster,
            SortMode::Popularity,
            SourcePreference::Fanart,
            &LanguagePolicy::default(),
        );

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].url, "fanart-item");
    }

    #[test]
    fn test_likes_scaled_onto_rating_range() {
        let mut liked = candidate("liked");
        liked.likes = 10;

        assert!((popularity_score(&liked) - 7.3).abs() < 1e-9);
    }

    #[test]
    fn test_no_signal_gets_neutral_prior() {
        let plain = candidate("plain");
        assert!((popularity_score(&plain) - BAYESIAN_C).abs() < 1e-9);
    }

    #[test]
    fn test_auto_apply_filter_language_free_strict() {
        let mut tagged = candidate("tagged");
        tagged.language = "en".to_string();

        // No text-free fanart available: blocked, no fallback.
        let filtered = filter_for_auto_apply(
            &[tagged.clone()],
            ArtType::Fanart,
            &LanguagePolicy::default(),
        );
        assert!(filtered.is_empty());

        let mut clean = candidate("clean");
        clean.language = String::new();
        let filtered = filter_for_auto_apply(
            &[tagged, clean],
            ArtType::Fanart,
            &LanguagePolicy::default(),
        );
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].url, "clean");
    }

    #[test]
    fn test_auto_apply_filter_language_required_falls_back() {
        let mut german = candidate("de");
        german.language = "de".to_string();

        let filtered = filter_for_auto_apply(
            &[german.clone()],
            ArtType::Poster,
            &LanguagePolicy::default(),
        );
        // Nothing matched "en": fall back to the unfiltered list.
        assert_eq!(filtered.len(), 1);

        let english = candidate("en");
        let filtered = filter_for_auto_apply(
            &[german, english],
            ArtType::Poster,
            &LanguagePolicy::default(),
        );
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].url, "en");
    }

    #[test]
    fn test_review_filter_fanart_text_free_only() {
        let mut tagged = candidate("tagged");
        tagged.language = "en".to_string();
        let mut clean = candidate("clean");
        clean.language = String::new();

        let filtered = filter_for_review(
            &[tagged, clean],
            ArtType::Fanart,
            &LanguagePolicy::default(),
        );
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].url, "clean");
    }
}
