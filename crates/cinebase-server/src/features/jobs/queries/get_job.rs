//! Get job query

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::Services;
use crate::queue::{Job, QueueError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobQuery {
    pub job_id: i64,
}

impl Request<Result<Job, QueueError>> for GetJobQuery {}

pub async fn handle(services: Services, query: GetJobQuery) -> Result<Job, QueueError> {
    services
        .queue
        .get(query.job_id)
        .await?
        .ok_or(QueueError::NotFound(query.job_id))
}
