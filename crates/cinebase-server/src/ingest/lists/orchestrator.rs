//! List import orchestrator

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use super::{fail_import, write_details, write_status, ListImportDetails, ListImportStatus};
use crate::ingest::context::Services;
use crate::ingest::jobs::JobArgs;
use crate::notify::{topics, ImportEvent};
use crate::progress::ProgressError;
use crate::queue::runner::{JobError, JobOutcome, JobResult};

fn progress_err(err: ProgressError) -> JobError {
    JobError::retryable(err)
}

/// Determine the page count, queue one page job per page and schedule the
/// first completion check. `import_id` is the orchestrator's own job id.
///
/// Orchestration failures are terminal: the import goes to `failed` and no
/// checker is scheduled.
#[instrument(skip(services))]
pub async fn orchestrate(services: &Services, import_id: i64, list_key: &str, list_id: &str) -> JobResult {
    let mut details = ListImportDetails {
        import_id,
        list_id: list_id.to_string(),
        total_pages: None,
        expected_items: None,
        started_at: Utc::now(),
        finished_at: None,
        total_movies: None,
        error: None,
    };
    write_details(services, list_key, &details).await.map_err(progress_err)?;
    write_status(services, list_key, ListImportStatus::Orchestrating)
        .await
        .map_err(progress_err)?;

    let info = match services.lists.list_info(list_id).await {
        Ok(info) => info,
        Err(e) => {
            error!(error = %e, "Cannot determine list size");
            let reason = format!("list_info_unavailable: {}", e);
            fail_import(services, list_key, details, &reason).await.map_err(progress_err)?;
            return Ok(JobOutcome::Cancel(reason));
        },
    };

    details.total_pages = Some(info.total_pages);
    details.expected_items = Some(info.item_count);
    if info.total_pages == 0 {
        info!(list_name = %info.name, "List is empty");
        details.finished_at = Some(Utc::now());
        details.total_movies = Some(0);
        write_details(services, list_key, &details).await.map_err(progress_err)?;
        write_status(services, list_key, ListImportStatus::NoData)
            .await
            .map_err(progress_err)?;
        return Ok(JobOutcome::Complete(json!({"total_pages": 0})));
    }
    write_details(services, list_key, &details).await.map_err(progress_err)?;

    let pages: Vec<_> = (1..=info.total_pages)
        .map(|page| {
            JobArgs::ListPage {
                list_key: list_key.to_string(),
                list_id: list_id.to_string(),
                page,
                import_id,
            }
            .to_new_job()
        })
        .collect();
    match services.queue.insert_all(pages).await {
        Ok(results) if results.len() == info.total_pages as usize => {
            let conflicts = results.iter().filter(|r| r.conflict).count();
            if conflicts > 0 {
                warn!(conflicts, "Some page jobs were already queued");
            }
        },
        Ok(results) => {
            let reason = format!("queued {} of {} page jobs", results.len(), info.total_pages);
            fail_import(services, list_key, details, &reason).await.map_err(progress_err)?;
            return Ok(JobOutcome::Cancel(reason));
        },
        Err(e) => {
            error!(error = %e, "Failed to queue page jobs");
            let reason = format!("page_queue_failed: {}", e);
            fail_import(services, list_key, details, &reason).await.map_err(progress_err)?;
            return Ok(JobOutcome::Cancel(reason));
        },
    }

    write_status(services, list_key, ListImportStatus::Queued)
        .await
        .map_err(progress_err)?;

    let checker = JobArgs::ListCompletion {
        list_key: list_key.to_string(),
        import_id,
        total_pages: info.total_pages,
        check: 0,
    };
    services
        .queue
        .insert(checker.to_new_job_in(services.config.lists.completion_delay()))
        .await?;

    info!(
        list_name = %info.name,
        total_pages = info.total_pages,
        expected_items = info.item_count,
        "List import queued"
    );
    services.notify(
        topics::LIST_IMPORT,
        ImportEvent::ListImportStarted {
            list_key: list_key.to_string(),
            import_id,
            total_pages: info.total_pages,
        },
    );

    Ok(JobOutcome::Complete(json!({
        "import_id": import_id,
        "total_pages": info.total_pages,
        "expected_items": info.item_count,
    })))
}
