//! Backfill health check
//!
//! Also run periodically by the server; exposed so operators can force a
//! repair without waiting for the next tick.

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::{backfill, BackfillError, HealthReport, Services};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackfillHealthQuery;

impl Request<Result<HealthReport, BackfillError>> for BackfillHealthQuery {}

#[tracing::instrument(skip(services))]
pub async fn handle(services: Services, _query: BackfillHealthQuery) -> Result<HealthReport, BackfillError> {
    backfill::health_check(&services).await
}
