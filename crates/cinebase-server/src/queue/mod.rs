//! Durable job queue
//!
//! Jobs are rows with a worker name, JSON arguments and a lifecycle state
//! (see [`JobState`]). Producers insert jobs, optionally scheduled in the
//! future and optionally unique; the [`runner::QueueRunner`] claims available
//! jobs per queue, executes them through the worker dispatcher and records
//! the outcome.
//!
//! Two backends implement [`JobQueue`]:
//!
//! - [`PgJobQueue`]: the `jobs` table, claimed with `FOR UPDATE SKIP LOCKED`
//! - [`MemoryJobQueue`]: a mutex-guarded map for tests and local runs

pub mod memory;
pub mod postgres;
pub mod runner;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryJobQueue;
pub use postgres::PgJobQueue;
pub use types::{
    AttemptError, InsertResult, Job, JobFilter, JobState, NewJob, RescueCounts, StateCounts, UniqueOpts,
};

/// Job queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Job {0} not found")]
    NotFound(i64),

    #[error("Job {id} is {state}, expected {expected}")]
    InvalidState {
        id: i64,
        state: JobState,
        expected: &'static str,
    },

    #[error("Corrupt job row: {0}")]
    Corrupt(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Storage contract for jobs
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert one job, honoring its uniqueness options.
    async fn insert(&self, job: NewJob) -> QueueResult<InsertResult>;

    /// Insert many jobs atomically; results are in input order.
    async fn insert_all(&self, jobs: Vec<NewJob>) -> QueueResult<Vec<InsertResult>>;

    async fn get(&self, id: i64) -> QueueResult<Option<Job>>;

    /// List jobs matching the filter, newest first.
    async fn list(&self, filter: &JobFilter) -> QueueResult<Vec<Job>>;

    /// Count matching jobs grouped by state. `filter.limit` is ignored.
    async fn count_by_state(&self, filter: &JobFilter) -> QueueResult<StateCounts>;

    /// Claim up to `limit` jobs from `queue` that are ready at `ready_at`.
    ///
    /// Scheduled and retryable jobs whose time has come are claimed along
    /// with available ones. Claimed jobs move to `executing` with their
    /// attempt counter incremented.
    async fn fetch_available(
        &self,
        queue: &str,
        limit: usize,
        ready_at: DateTime<Utc>,
        node: &str,
    ) -> QueueResult<Vec<Job>>;

    /// Mark an executing job completed and store its result metadata.
    async fn complete(&self, id: i64, meta: Value) -> QueueResult<()>;

    /// Record a failed attempt and schedule the next one.
    async fn retry(&self, id: i64, error: &str, retry_at: DateTime<Utc>) -> QueueResult<()>;

    /// Record a failure and stop retrying.
    async fn discard(&self, id: i64, error: &str) -> QueueResult<()>;

    /// Cancel a job that is not finished. Cancelling a terminal job is a no-op.
    async fn cancel(&self, id: i64, reason: &str) -> QueueResult<()>;

    /// Take back jobs still `executing` from an attempt that started before
    /// `attempted_before`. Their node died or lost its connection; a live
    /// attempt never outlasts the job timeout. Jobs with attempts left become
    /// retryable now, the rest are discarded.
    async fn rescue_stuck(&self, attempted_before: DateTime<Utc>) -> QueueResult<RescueCounts>;

    /// Count matching jobs in any of the filter's states.
    async fn count(&self, filter: &JobFilter) -> QueueResult<i64> {
        Ok(self.count_by_state(filter).await?.total())
    }
}
