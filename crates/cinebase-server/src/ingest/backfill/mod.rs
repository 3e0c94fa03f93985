//! Continuous backfill
//!
//! A self-rescheduling chain of two job kinds. `queue_batch` runs gap
//! analysis and queues the next batch of missing movies; `check_completion`
//! waits for that batch to drain and then queues the next `queue_batch`.
//! The status in the progress store is the only switch: every step reads it
//! first and a stopped loop simply schedules nothing.

pub mod machine;
pub mod worker;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use super::context::Services;
use super::gap::GapError;
use super::jobs::{workers, JobArgs};
use crate::notify::{topics, ImportEvent};
use crate::progress::{self, keys, ProgressError, ProgressResult};
use crate::queue::{JobFilter, JobState, QueueError, QueueResult};

pub use machine::{step, BackfillSettings, BackfillStatus, Effect, Input, Transition};
pub use worker::run_step;

#[derive(Error, Debug)]
pub enum BackfillError {
    #[error("Backfill is already running")]
    AlreadyRunning,

    #[error("Backfill already completed")]
    AlreadyCompleted,

    #[error("Backfill was never started")]
    NotStarted,

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Gap(#[from] GapError),
}

/// Snapshot of the backfill loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackfillReport {
    pub status: BackfillStatus,
    pub current_batch: i64,
    /// Backfill fetches not yet finished
    pub pending_jobs: i64,
    /// Missing movies at the last gap analysis
    pub estimated_remaining: Option<i64>,
    pub total_queued: i64,
    pub batch_size: Option<usize>,
    pub min_popularity: Option<f64>,
    pub last_step_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: BackfillStatus,
    /// Backfill step jobs waiting or executing
    pub live_jobs: i64,
    /// True when a running loop had no live job and was re-seeded
    pub repaired: bool,
}

pub(crate) async fn read_status(services: &Services) -> ProgressResult<BackfillStatus> {
    Ok(progress::read(services.progress.as_ref(), keys::BACKFILL_STATUS)
        .await?
        .unwrap_or_default())
}

pub(crate) async fn set_status(services: &Services, status: BackfillStatus) -> ProgressResult<()> {
    progress::write(services.progress.as_ref(), keys::BACKFILL_STATUS, &status).await?;
    services.notify(
        topics::BACKFILL,
        ImportEvent::BackfillStatusChanged {
            status: status.to_string(),
        },
    );
    Ok(())
}

async fn read_settings(services: &Services) -> ProgressResult<Option<BackfillSettings>> {
    progress::read(services.progress.as_ref(), keys::BACKFILL_SETTINGS).await
}

/// Backfill fetch jobs that have not finished
pub(crate) async fn pending_fetches(services: &Services) -> QueueResult<i64> {
    let filter = JobFilter::worker(workers::FETCH_MOVIE)
        .args_contains(json!({"origin": {"kind": "backfill"}}))
        .states(&JobState::PENDING);
    services.queue.count(&filter).await
}

async fn live_step_jobs(services: &Services) -> QueueResult<i64> {
    let filter = JobFilter::worker(workers::BACKFILL).states(&JobState::PENDING);
    services.queue.count(&filter).await
}

async fn seed(services: &Services, settings: &BackfillSettings) -> QueueResult<()> {
    let result = services.enqueue(&JobArgs::Backfill(settings.queue_batch())).await?;
    if result.conflict {
        info!(job_id = result.job_id, "Queue-batch step already waiting");
    }
    Ok(())
}

/// Start a new backfill run. Counters restart from zero.
pub async fn start(
    services: &Services,
    batch_size: Option<usize>,
    min_popularity: Option<f64>,
) -> Result<BackfillReport, BackfillError> {
    if read_status(services).await? == BackfillStatus::Running {
        return Err(BackfillError::AlreadyRunning);
    }
    let settings = BackfillSettings {
        batch_size: batch_size.unwrap_or(services.config.backfill.default_batch_size),
        min_popularity,
    };
    if settings.batch_size == 0 {
        return Err(BackfillError::InvalidBatchSize);
    }

    seed(services, &settings).await?;
    progress::write(services.progress.as_ref(), keys::BACKFILL_SETTINGS, &settings).await?;
    services.progress.put(keys::BACKFILL_CURRENT_BATCH, json!(1)).await?;
    services.progress.put(keys::BACKFILL_TOTAL_QUEUED, json!(0)).await?;
    set_status(services, BackfillStatus::Running).await?;

    info!(
        batch_size = settings.batch_size,
        min_popularity = ?settings.min_popularity,
        "Backfill started"
    );
    status(services).await
}

/// Pause the loop. Steps already executing finish but schedule nothing.
pub async fn stop(services: &Services) -> Result<BackfillReport, BackfillError> {
    set_status(services, BackfillStatus::Paused).await?;
    info!("Backfill paused");
    status(services).await
}

/// Continue a paused run with its persisted settings.
pub async fn resume(services: &Services) -> Result<BackfillReport, BackfillError> {
    match read_status(services).await? {
        BackfillStatus::Running => return Err(BackfillError::AlreadyRunning),
        BackfillStatus::Completed => return Err(BackfillError::AlreadyCompleted),
        BackfillStatus::NotStarted => return Err(BackfillError::NotStarted),
        BackfillStatus::Paused => {},
    }
    let settings = read_settings(services).await?.ok_or(BackfillError::NotStarted)?;

    seed(services, &settings).await?;
    set_status(services, BackfillStatus::Running).await?;
    info!(batch_size = settings.batch_size, "Backfill resumed");
    status(services).await
}

pub async fn status(services: &Services) -> Result<BackfillReport, BackfillError> {
    let settings = read_settings(services).await?;
    let store = services.progress.as_ref();
    Ok(BackfillReport {
        status: read_status(services).await?,
        current_batch: progress::counter(store, keys::BACKFILL_CURRENT_BATCH).await?,
        pending_jobs: pending_fetches(services).await?,
        estimated_remaining: progress::read(store, keys::GAP_MISSING_COUNT).await?,
        total_queued: progress::counter(store, keys::BACKFILL_TOTAL_QUEUED).await?,
        batch_size: settings.map(|s| s.batch_size),
        min_popularity: settings.and_then(|s| s.min_popularity),
        last_step_at: progress::read(store, keys::BACKFILL_LAST_STEP_AT).await?,
    })
}

/// Re-seed a running loop whose job chain was lost.
pub async fn health_check(services: &Services) -> Result<HealthReport, BackfillError> {
    let status = read_status(services).await?;
    let live_jobs = live_step_jobs(services).await?;
    let mut repaired = false;

    if status == BackfillStatus::Running && live_jobs == 0 {
        match read_settings(services).await? {
            Some(settings) => {
                warn!("Running backfill has no live step job, re-seeding");
                seed(services, &settings).await?;
                repaired = true;
            },
            None => warn!("Running backfill has no settings, cannot re-seed"),
        }
    }

    Ok(HealthReport {
        status,
        live_jobs,
        repaired,
    })
}
