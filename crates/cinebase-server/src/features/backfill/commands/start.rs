//! Start backfill command

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::{backfill, BackfillError, BackfillReport, Services};

/// Command to start a new backfill run
///
/// Omitted fields fall back to `BACKFILL_BATCH_SIZE` and no popularity floor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartBackfillCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Only queue movies at least this popular
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_popularity: Option<f64>,
}

impl Request<Result<BackfillReport, BackfillError>> for StartBackfillCommand {}

#[tracing::instrument(skip(services))]
pub async fn handle(services: Services, command: StartBackfillCommand) -> Result<BackfillReport, BackfillError> {
    backfill::start(&services, command.batch_size, command.min_popularity).await
}
