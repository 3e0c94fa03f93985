//! List import completion checker
//!
//! Counts the import's page jobs by state. Any failed page fails the import;
//! all pages finished completes it; otherwise the checker schedules its own
//! successor until the check budget runs out.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, instrument};

use super::{fail_import, read_details, write_details, write_status, ListImportStatus};
use crate::ingest::context::Services;
use crate::ingest::jobs::{workers, JobArgs};
use crate::notify::{topics, ImportEvent};
use crate::queue::runner::{JobError, JobOutcome, JobResult};
use crate::queue::JobFilter;

/// Reason recorded when the checker gives up
pub const CHECKS_EXHAUSTED: &str = "completion_check_exhausted";

#[instrument(skip(services))]
pub async fn check_completion(
    services: &Services,
    list_key: &str,
    import_id: i64,
    total_pages: u32,
    check: u32,
) -> JobResult {
    let details = read_details(services, list_key).await.map_err(JobError::retryable)?;
    let status = super::read_status(services, list_key)
        .await
        .map_err(JobError::retryable)?;
    let Some(mut details) = details.filter(|d| d.import_id == import_id) else {
        debug!("Import superseded, checker exits");
        return Ok(JobOutcome::Complete(json!({"stale": true})));
    };
    if status.is_some_and(|s| s.is_terminal()) {
        debug!(?status, "Import already finished");
        return Ok(JobOutcome::Complete(json!({"stale": true})));
    }

    let filter = JobFilter::worker(workers::LIST_PAGE).args_contains(json!({ "import_id": import_id }));
    let counts = services.queue.count_by_state(&filter).await?;

    if counts.failed() > 0 {
        let reason = format!("{} of {} pages failed", counts.failed(), total_pages);
        error!(failed = counts.failed(), total_pages, "List import failed");
        fail_import(services, list_key, details, &reason)
            .await
            .map_err(JobError::retryable)?;
        return Ok(JobOutcome::Complete(json!({"status": "failed", "reason": reason})));
    }

    if counts.pending() == 0 && counts.completed >= i64::from(total_pages) {
        let total_movies = services.store.count_canonical(list_key).await?;
        details.total_movies = Some(total_movies);
        details.finished_at = Some(Utc::now());
        write_details(services, list_key, &details)
            .await
            .map_err(JobError::retryable)?;
        write_status(services, list_key, ListImportStatus::Completed)
            .await
            .map_err(JobError::retryable)?;
        info!(total_movies, checks = check + 1, "List import completed");
        services.notify(
            topics::LIST_IMPORT,
            ImportEvent::ListImportCompleted {
                list_key: list_key.to_string(),
                import_id,
                total_movies,
            },
        );
        return Ok(JobOutcome::Complete(json!({
            "status": "completed",
            "total_movies": total_movies,
        })));
    }

    let next = check + 1;
    if next >= services.config.lists.max_checks {
        error!(
            checks = next,
            pending = counts.pending(),
            completed = counts.completed,
            "List import did not finish, giving up"
        );
        fail_import(services, list_key, details, CHECKS_EXHAUSTED)
            .await
            .map_err(JobError::retryable)?;
        return Ok(JobOutcome::Complete(json!({"status": "failed", "reason": CHECKS_EXHAUSTED})));
    }

    let successor = JobArgs::ListCompletion {
        list_key: list_key.to_string(),
        import_id,
        total_pages,
        check: next,
    };
    services
        .queue
        .insert(successor.to_new_job_in(services.config.lists.completion_delay()))
        .await?;
    debug!(
        pending = counts.pending(),
        completed = counts.completed,
        next_check = next,
        "Pages still running"
    );
    Ok(JobOutcome::Complete(json!({
        "status": "waiting",
        "pending": counts.pending(),
        "completed": counts.completed,
        "next_check": next,
    })))
}
