//! Festival year progress query

use mediator::Request;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ingest::{ImportError, Services};
use crate::progress::{self, keys};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFestivalYearQuery {
    pub festival: String,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FestivalYearProgress {
    pub festival: String,
    pub year: i32,
    pub imported: bool,
    /// Last recorded outcome: a summary or a failure reason
    pub progress: Option<Value>,
}

impl Request<Result<FestivalYearProgress, ImportError>> for GetFestivalYearQuery {}

pub async fn handle(services: Services, query: GetFestivalYearQuery) -> Result<FestivalYearProgress, ImportError> {
    if services.config.festivals.get(&query.festival).is_none() {
        return Err(ImportError::UnknownFestival(query.festival));
    }
    let progress: Option<Value> = progress::read(
        services.progress.as_ref(),
        &keys::festival_import(&query.festival, query.year),
    )
    .await?;
    let imported = progress
        .as_ref()
        .and_then(|p| p.get("status"))
        .and_then(Value::as_str)
        == Some("completed");

    Ok(FestivalYearProgress {
        festival: query.festival,
        year: query.year,
        imported,
        progress,
    })
}
