//! Curated list imports
//!
//! A list import fans out into one page job per page and fans back in
//! through a self-rescheduling completion checker:
//!
//! ```text
//! ORCHESTRATING -> QUEUED -> IN_PROGRESS -> COMPLETED | FAILED
//!                                        \-> NO_DATA (empty list)
//! ```
//!
//! The orchestrator's job id is the import id. Page jobs carry it in their
//! args so the checker can count them by state without any shared counter.

pub mod completion;
pub mod orchestrator;
pub mod page;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

use super::context::Services;
use super::jobs::JobArgs;
use super::ImportError;
use crate::notify::{topics, ImportEvent};
use crate::progress::{self, keys, ProgressResult};
use crate::queue::InsertResult;

pub use completion::check_completion;
pub use orchestrator::orchestrate;
pub use page::{process_page, PageStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListImportStatus {
    Orchestrating,
    Queued,
    InProgress,
    Completed,
    Failed,
    NoData,
}

impl ListImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListImportStatus::Orchestrating => "orchestrating",
            ListImportStatus::Queued => "queued",
            ListImportStatus::InProgress => "in_progress",
            ListImportStatus::Completed => "completed",
            ListImportStatus::Failed => "failed",
            ListImportStatus::NoData => "no_data",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ListImportStatus::Completed | ListImportStatus::Failed | ListImportStatus::NoData
        )
    }
}

impl fmt::Display for ListImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of the latest import of a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListImportDetails {
    pub import_id: i64,
    pub list_id: String,
    pub total_pages: Option<u32>,
    pub expected_items: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Movies tagged with the list once the import finished
    pub total_movies: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListImportView {
    pub list_key: String,
    pub status: Option<ListImportStatus>,
    /// `not_started`, `in_progress`, `completed`, `failed:<reason>` or `no_data`
    pub display: String,
    pub details: Option<ListImportDetails>,
}

/// Status for progress display
pub fn display_status(status: Option<ListImportStatus>, details: Option<&ListImportDetails>) -> String {
    match status {
        None => "not_started".to_string(),
        Some(ListImportStatus::Orchestrating | ListImportStatus::Queued | ListImportStatus::InProgress) => {
            "in_progress".to_string()
        },
        Some(ListImportStatus::Completed) => "completed".to_string(),
        Some(ListImportStatus::NoData) => "no_data".to_string(),
        Some(ListImportStatus::Failed) => format!(
            "failed:{}",
            details.and_then(|d| d.error.as_deref()).unwrap_or("unknown")
        ),
    }
}

pub async fn read_status(services: &Services, list_key: &str) -> ProgressResult<Option<ListImportStatus>> {
    progress::read(services.progress.as_ref(), &keys::list_import_status(list_key)).await
}

pub async fn read_details(services: &Services, list_key: &str) -> ProgressResult<Option<ListImportDetails>> {
    progress::read(services.progress.as_ref(), &keys::list_import(list_key)).await
}

pub async fn write_status(services: &Services, list_key: &str, status: ListImportStatus) -> ProgressResult<()> {
    progress::write(services.progress.as_ref(), &keys::list_import_status(list_key), &status).await
}

pub async fn write_details(services: &Services, list_key: &str, details: &ListImportDetails) -> ProgressResult<()> {
    progress::write(services.progress.as_ref(), &keys::list_import(list_key), details).await
}

/// Move `Queued` to `InProgress`; any other current status is left alone.
pub async fn mark_in_progress(services: &Services, list_key: &str) -> ProgressResult<bool> {
    services
        .progress
        .compare_and_swap(
            &keys::list_import_status(list_key),
            Some(&json!(ListImportStatus::Queued)),
            json!(ListImportStatus::InProgress),
        )
        .await
}

/// Terminal failure: record the reason, publish it, leave no checker behind.
pub async fn fail_import(
    services: &Services,
    list_key: &str,
    mut details: ListImportDetails,
    reason: &str,
) -> ProgressResult<()> {
    details.error = Some(reason.to_string());
    details.finished_at = Some(Utc::now());
    write_details(services, list_key, &details).await?;
    write_status(services, list_key, ListImportStatus::Failed).await?;
    services.notify(
        topics::LIST_IMPORT,
        ImportEvent::ListImportFailed {
            list_key: list_key.to_string(),
            import_id: details.import_id,
            reason: reason.to_string(),
        },
    );
    Ok(())
}

pub async fn import_view(services: &Services, list_key: &str) -> ProgressResult<ListImportView> {
    let status = read_status(services, list_key).await?;
    let details = match status {
        Some(_) => read_details(services, list_key).await?,
        None => None,
    };
    Ok(ListImportView {
        list_key: list_key.to_string(),
        display: display_status(status, details.as_ref()),
        status,
        details,
    })
}

/// Queue an import of `list_id` under `list_key`. Refused while an import
/// of the same list is still running.
pub async fn queue_import(services: &Services, list_key: &str, list_id: &str) -> Result<InsertResult, ImportError> {
    if let Some(status) = read_status(services, list_key).await? {
        if !status.is_terminal() {
            return Err(ImportError::AlreadyRunning(list_key.to_string()));
        }
    }
    let result = services
        .enqueue(&JobArgs::ListImport {
            list_key: list_key.to_string(),
            list_id: list_id.to_string(),
        })
        .await?;
    Ok(result)
}
