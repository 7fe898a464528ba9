pub mod core;
pub mod edgar;
pub mod enrich;
pub mod error;
pub mod pipeline;
pub mod publish;
pub mod reconcile;
pub mod record;
pub mod storage;
pub mod valuation;

// Re-exports
pub use self::core::{TrackerConfig, TrackerService};
pub use error::{EdgarError, FeedError, PipelineError};
pub use pipeline::{CycleSummary, Pipeline};
pub use record::{FilingRecord, FilingStatus, RegistrantId};
