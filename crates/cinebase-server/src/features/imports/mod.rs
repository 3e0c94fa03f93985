//! Imports feature module
//!
//! Queue curated list imports, festival imports and one-off movie fetches,
//! and read their progress. Every command only enqueues; the work happens in
//! the background runner.

pub mod commands;
pub mod queries;
pub mod routes;

use serde::Serialize;

use crate::queue::InsertResult;

pub use routes::imports_routes;

/// Response for a command that queued a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueuedJob {
    pub job_id: i64,
    /// True when an identical job was already waiting
    pub already_queued: bool,
}

impl From<InsertResult> for QueuedJob {
    fn from(result: InsertResult) -> Self {
        Self {
            job_id: result.job_id,
            already_queued: result.conflict,
        }
    }
}
