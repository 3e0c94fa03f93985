//! Resume backfill command

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::{backfill, BackfillError, BackfillReport, Services};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeBackfillCommand;

impl Request<Result<BackfillReport, BackfillError>> for ResumeBackfillCommand {}

#[tracing::instrument(skip(services))]
pub async fn handle(services: Services, _command: ResumeBackfillCommand) -> Result<BackfillReport, BackfillError> {
    backfill::resume(&services).await
}
