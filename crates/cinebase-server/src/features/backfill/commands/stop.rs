//! Stop backfill command

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::{backfill, BackfillError, BackfillReport, Services};

/// Pause the loop; queued fetches keep running
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopBackfillCommand;

impl Request<Result<BackfillReport, BackfillError>> for StopBackfillCommand {}

#[tracing::instrument(skip(services))]
pub async fn handle(services: Services, _command: StopBackfillCommand) -> Result<BackfillReport, BackfillError> {
    backfill::stop(&services).await
}
