//! Backfill status query

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::{backfill, BackfillError, BackfillReport, Services};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetBackfillStatusQuery;

impl Request<Result<BackfillReport, BackfillError>> for GetBackfillStatusQuery {}

pub async fn handle(services: Services, _query: GetBackfillStatusQuery) -> Result<BackfillReport, BackfillError> {
    backfill::status(&services).await
}
