//! Pipeline components: provider fetch layer, ranking, scanner, reviewer,
//! processor, pre-cache pool and the task registry.

pub mod chooser;
pub mod fanarttv;
pub mod fetch;
pub mod precache;
pub mod processor;
pub mod ranking;
pub mod report;
pub mod reviewer;
pub mod scanner;
pub mod source_fetcher;
pub mod task_registry;
pub mod tmdb;

pub use chooser::{ArtworkChooser, ChooserAction, ChooserOutcome, ChooserRequest};
pub use fanarttv::FanartTvClient;
pub use fetch::{FetchError, FetchResponse, RateLimitedFetcher, RateLimiter};
pub use precache::{PrecachePool, PrecacheStats};
pub use processor::{ProcessReport, Processor};
pub use ranking::LanguagePolicy;
pub use reviewer::{ReviewOutcome, Reviewer};
pub use scanner::{ScanOptions, ScanOutcome, ScanScope, ScanStatus, Scanner, UpgradeThresholds};
pub use source_fetcher::{ArtworkMap, CandidateSource, SourceFetcher};
pub use task_registry::{TaskBusy, TaskHandle, TaskRegistry};
pub use tmdb::TmdbClient;
