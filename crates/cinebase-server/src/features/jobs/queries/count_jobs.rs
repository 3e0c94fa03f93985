//! Job counts per state

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::Services;
use crate::queue::{JobFilter, QueueError, StateCounts};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountJobsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
}

impl Request<Result<StateCounts, QueueError>> for CountJobsQuery {}

pub async fn handle(services: Services, query: CountJobsQuery) -> Result<StateCounts, QueueError> {
    let filter = JobFilter {
        worker: query.worker,
        queue: query.queue,
        ..Default::default()
    };
    services.queue.count_by_state(&filter).await
}
