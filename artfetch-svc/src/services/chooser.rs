//! Interactive chooser boundary.
//!
//! The modal selection UI lives outside this crate; the reviewer drives it
//! through this trait. Tests use scripted implementations.

use async_trait::async_trait;

use crate::models::{ArtType, ArtworkCandidate, MediaType, ReviewMode};

/// Everything the UI needs to present one choice.
#[derive(Debug, Clone)]
pub struct ChooserRequest {
    pub title: String,
    pub year: String,
    pub media_type: MediaType,
    pub art_type: ArtType,
    /// Candidates after language filtering, ranked
    pub candidates: Vec<ArtworkCandidate>,
    /// The unfiltered list, for a "show all" toggle
    pub all_candidates: Vec<ArtworkCandidate>,
    /// URL currently set in the library, empty when the slot is missing
    pub current_url: String,
    pub review_mode: ReviewMode,
}

/// Primary outcome of one presentation.
#[derive(Debug, Clone)]
pub enum ChooserAction {
    /// Apply this candidate to the slot
    Selected(ArtworkCandidate),
    /// Leave the slot alone and move on
    Skip,
    /// Abort the whole review run
    Cancel,
}

/// Result of one presentation: the primary action plus any ordered
/// multi-select picks for extra slots (fanart, fanart1, ...).
#[derive(Debug, Clone)]
pub struct ChooserOutcome {
    pub action: ChooserAction,
    /// (slot name, url) pairs, in selection order
    pub extra_selections: Vec<(String, String)>,
}

impl ChooserOutcome {
    pub fn selected(candidate: ArtworkCandidate) -> Self {
        Self {
            action: ChooserAction::Selected(candidate),
            extra_selections: Vec::new(),
        }
    }

    pub fn skip() -> Self {
        Self {
            action: ChooserAction::Skip,
            extra_selections: Vec::new(),
        }
    }

    pub fn cancel() -> Self {
        Self {
            action: ChooserAction::Cancel,
            extra_selections: Vec::new(),
        }
    }
}

/// Modal chooser exposed by the UI layer.
#[async_trait]
pub trait ArtworkChooser: Send + Sync {
    async fn present(&self, request: ChooserRequest) -> ChooserOutcome;
}

/// Build the slot name for the i-th extra fanart selection.
///
/// Index 0 is the primary "fanart" slot, further picks become "fanart1",
/// "fanart2", ...
pub fn extra_slot_name(base: ArtType, index: usize) -> String {
    if index == 0 {
        base.as_str().to_string()
    } else {
        format!("{}{}", base.as_str(), index)
    }
}
