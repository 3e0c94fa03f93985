//! Backfill job worker: gathers inputs for [`step`] and applies its effects

use chrono::Utc;
use serde_json::json;
use std::collections::VecDeque;
use tracing::{debug, info, instrument};

use super::machine::{step, BackfillSettings, Effect, Input};
use super::{pending_fetches, read_status, set_status};
use crate::ingest::context::Services;
use crate::ingest::gap::{find_missing_ids, GapQuery};
use crate::ingest::jobs::{BackfillStep, FetchOrigin, JobArgs};
use crate::notify::{topics, ImportEvent};
use crate::progress::keys;
use crate::queue::runner::{JobError, JobOutcome, JobResult};

fn progress_err(err: crate::progress::ProgressError) -> JobError {
    JobError::retryable(err)
}

#[instrument(skip(services), fields(step = backfill_step.name()))]
pub async fn run_step(services: &Services, backfill_step: &BackfillStep) -> JobResult {
    let config = &services.config.backfill;
    let settings = BackfillSettings::from(backfill_step);
    let status = read_status(services).await.map_err(progress_err)?;

    let input = match backfill_step {
        BackfillStep::QueueBatch { .. } => Input::QueueBatch {
            status,
            settings,
            pending: pending_fetches(services).await?,
        },
        BackfillStep::CheckCompletion { .. } => Input::CheckCompletion {
            status,
            settings,
            in_flight: pending_fetches(services).await?,
        },
    };
    let first = step(config, input);
    let mut reasons = vec![first.reason];
    let mut effects: VecDeque<Effect> = first.effects.into();
    let mut queued = 0usize;

    while let Some(effect) = effects.pop_front() {
        match effect {
            Effect::RunGapAnalysis(settings) => {
                let query = GapQuery {
                    min_popularity: settings.min_popularity,
                    limit: Some(settings.batch_size),
                    ..Default::default()
                };
                let missing = find_missing_ids(services, &query).await?;
                // Gap analysis can be slow; a stop issued meanwhile wins
                let status = read_status(services).await.map_err(progress_err)?;
                let next = step(
                    config,
                    Input::GapResult {
                        status,
                        settings,
                        missing: missing.into_iter().map(|m| m.tmdb_id).collect(),
                    },
                );
                reasons.push(next.reason);
                effects.extend(next.effects);
            },
            Effect::EnqueueFetches(ids) => {
                queued += enqueue_fetches(services, &ids).await?;
            },
            Effect::ScheduleStep { step, delay } => {
                let result = services
                    .queue
                    .insert(JobArgs::Backfill(step.clone()).to_new_job_in(delay))
                    .await?;
                debug!(next = step.name(), delay_secs = delay.as_secs(), conflict = result.conflict, "Scheduled backfill step");
            },
            Effect::AdvanceBatch => {
                let batch = services
                    .progress
                    .increment(keys::BACKFILL_CURRENT_BATCH, 1)
                    .await
                    .map_err(progress_err)?;
                info!(batch, "Backfill batch finished");
            },
            Effect::SetStatus(status) => {
                set_status(services, status).await.map_err(progress_err)?;
                info!(status = %status, "Backfill status changed");
            },
        }
    }

    services
        .progress
        .put(keys::BACKFILL_LAST_STEP_AT, json!(Utc::now()))
        .await
        .map_err(progress_err)?;

    Ok(JobOutcome::Complete(json!({
        "status": status,
        "transitions": reasons,
        "queued": queued,
    })))
}

/// Queue backfill fetches in chunks; returns how many were new.
async fn enqueue_fetches(services: &Services, ids: &[i64]) -> Result<usize, JobError> {
    let chunk_size = services.config.backfill.insert_chunk.max(1);
    let mut inserted = 0usize;
    for chunk in ids.chunks(chunk_size) {
        let jobs = chunk
            .iter()
            .map(|tmdb_id| {
                JobArgs::FetchMovie {
                    tmdb_id: *tmdb_id,
                    origin: FetchOrigin::Backfill,
                }
                .to_new_job()
            })
            .collect();
        let results = services.queue.insert_all(jobs).await?;
        inserted += results.iter().filter(|r| !r.conflict).count();
    }

    let total = services
        .progress
        .increment(keys::BACKFILL_TOTAL_QUEUED, inserted as i64)
        .await
        .map_err(progress_err)?;
    let batch = services
        .progress
        .get(keys::BACKFILL_CURRENT_BATCH)
        .await
        .map_err(progress_err)?
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    info!(batch, queued = inserted, total_queued = total, "Queued backfill batch");
    services.notify(topics::BACKFILL, ImportEvent::BackfillBatchQueued { batch, queued: inserted });
    Ok(inserted)
}
