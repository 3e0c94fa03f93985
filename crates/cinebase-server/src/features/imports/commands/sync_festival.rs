//! Festival sync command

use mediator::Request;
use serde::{Deserialize, Serialize};

use super::super::QueuedJob;
use crate::ingest::{festival, ImportError, Services};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Years from the first edition to now that have no ceremony yet
    #[default]
    Missing,
    /// Every year already stored, re-imported
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFestivalCommand {
    #[serde(default, skip_serializing)]
    pub festival: String,
    #[serde(default)]
    pub mode: SyncMode,
}

impl Request<Result<QueuedJob, ImportError>> for SyncFestivalCommand {}

#[tracing::instrument(skip(services))]
pub async fn handle(services: Services, command: SyncFestivalCommand) -> Result<QueuedJob, ImportError> {
    let result = match command.mode {
        SyncMode::Missing => festival::queue_sync_missing(&services, &command.festival).await?,
        SyncMode::All => festival::queue_resync_all(&services, &command.festival).await?,
    };
    Ok(result.into())
}
