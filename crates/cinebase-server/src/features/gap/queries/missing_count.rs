//! Missing movie count

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::gap::{missing_count, GapError};
use crate::ingest::Services;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissingCountQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_popularity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MissingCountResponse {
    pub missing: usize,
}

impl Request<Result<MissingCountResponse, GapError>> for MissingCountQuery {}

pub async fn handle(services: Services, query: MissingCountQuery) -> Result<MissingCountResponse, GapError> {
    let missing = missing_count(&services, query.min_popularity).await?;
    Ok(MissingCountResponse { missing })
}
