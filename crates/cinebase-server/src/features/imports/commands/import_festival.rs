//! Import festival years command

use mediator::Request;
use serde::{Deserialize, Serialize};

use super::super::QueuedJob;
use crate::ingest::{festival, ImportError, Services};

/// Import the given ceremony years of a configured festival
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportFestivalCommand {
    #[serde(default, skip_serializing)]
    pub festival: String,
    pub years: Vec<i32>,
}

impl Request<Result<QueuedJob, ImportError>> for ImportFestivalCommand {}

#[tracing::instrument(skip(services), fields(festival = %command.festival, years = command.years.len()))]
pub async fn handle(services: Services, command: ImportFestivalCommand) -> Result<QueuedJob, ImportError> {
    let result = festival::queue_import(&services, &command.festival, &command.years).await?;
    Ok(result.into())
}
