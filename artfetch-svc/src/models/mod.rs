//! Domain model types for the artwork pipeline

pub mod artwork;
pub mod queue;
pub mod session;

pub use artwork::{
    normalize_language_tag, ArtType, ArtworkCandidate, ExternalIds, MediaType, SortMode,
    SourcePreference,
};
pub use queue::{
    ArtItemEntry, ArtItemStatus, ArtRequest, EnqueueSpec, QueueEntry, QueueStatus, ReviewMode,
};
pub use session::{
    AutoRunReport, ReviewDetail, ReviewLog, ScanSession, SessionStats, SessionStatus,
};
