//! List page worker

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, instrument};

use super::mark_in_progress;
use crate::ingest::context::Services;
use crate::ingest::jobs::{FetchOrigin, JobArgs};
use crate::notify::{topics, ImportEvent};
use crate::queue::runner::{JobError, JobOutcome, JobResult};
use crate::store::CanonicalEntry;

/// What happened to the items of one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageStats {
    /// Stored movies newly tagged with the list
    pub updated: u32,
    /// Unknown movies handed to the fetch worker
    pub queued: u32,
    /// Stored movies already tagged
    pub skipped: u32,
}

/// Tag stored movies with the list and queue fetches for the rest.
///
/// Every step is idempotent, so a retried page only redoes work.
#[instrument(skip(services))]
pub async fn process_page(services: &Services, list_key: &str, list_id: &str, page: u32, import_id: i64) -> JobResult {
    if mark_in_progress(services, list_key).await.map_err(JobError::retryable)? {
        debug!("Import in progress");
    }

    let items = services.lists.list_page(list_id, page).await?;
    let mut stats = PageStats::default();

    for item in &items {
        match services.store.movie_by_tmdb_id(item.tmdb_id).await? {
            Some(movie) if movie.is_canonical(list_key) => stats.skipped += 1,
            Some(movie) => {
                let entry = CanonicalEntry {
                    import_id,
                    position: item.position,
                    added_at: Utc::now(),
                };
                if services.store.mark_canonical(movie.id, list_key, entry).await? {
                    stats.updated += 1;
                } else {
                    stats.skipped += 1;
                }
            },
            None => {
                services
                    .enqueue(&JobArgs::FetchMovie {
                        tmdb_id: item.tmdb_id,
                        origin: FetchOrigin::CanonicalList {
                            list_key: list_key.to_string(),
                            import_id,
                            position: item.position,
                        },
                    })
                    .await?;
                stats.queued += 1;
            },
        }
    }

    debug!(items = items.len(), ?stats, "Processed list page");
    services.notify(
        topics::LIST_IMPORT,
        ImportEvent::ListPageProcessed {
            list_key: list_key.to_string(),
            import_id,
            page,
            updated: stats.updated,
            queued: stats.queued,
            skipped: stats.skipped,
        },
    );

    Ok(JobOutcome::Complete(json!({
        "page": page,
        "items": items.len(),
        "updated": stats.updated,
        "queued": stats.queued,
        "skipped": stats.skipped,
    })))
}
