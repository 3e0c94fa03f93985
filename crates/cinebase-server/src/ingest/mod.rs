//! Background import pipeline
//!
//! # Architecture
//!
//! - **config**: queue concurrency, quality criteria and loop tuning (`INGEST_*`,
//!   `BACKFILL_*`, `LIST_IMPORT_*`, `MATCH_*`, `QUALITY_*`, `FESTIVAL_*`)
//! - **jobs**: [`JobArgs`], the typed arguments of every job
//! - **dispatch**: [`Dispatcher`], the runner's executor
//! - **gap**: missing-movie analysis against the daily id export
//! - **fetch** / **enrich**: the per-movie workers
//! - **lists**: curated list imports (orchestrator, pages, completion checker)
//! - **backfill**: the continuous gap-closing loop
//! - **festival** / **matching**: ceremony imports with fuzzy reconciliation
//!
//! Workers cooperate only through the queue and the progress store.

pub mod backfill;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod enrich;
pub mod festival;
pub mod fetch;
pub mod gap;
pub mod jobs;
pub mod lists;
pub mod matching;
pub mod quality;

use thiserror::Error;

use crate::progress::ProgressError;
use crate::queue::QueueError;

pub use backfill::{BackfillError, BackfillReport, BackfillStatus, HealthReport};
pub use config::IngestConfig;
pub use context::Services;
pub use dispatch::Dispatcher;
pub use jobs::{BackfillStep, FestivalAction, FetchOrigin, JobArgs};

/// Errors from queueing list and festival imports
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Import of '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Unknown festival '{0}'")]
    UnknownFestival(String),

    #[error("Year {year} is outside the range of {festival}")]
    InvalidYear { festival: String, year: i32 },

    #[error("No years given")]
    NoYears,

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// Queue a one-off fetch of a movie by TMDb id.
pub async fn queue_fetch(services: &Services, tmdb_id: i64) -> Result<crate::queue::InsertResult, ImportError> {
    Ok(services
        .enqueue(&JobArgs::FetchMovie {
            tmdb_id,
            origin: FetchOrigin::Manual,
        })
        .await?)
}
