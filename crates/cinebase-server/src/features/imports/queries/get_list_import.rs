//! List import progress query

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::lists::{self, ListImportView};
use crate::ingest::Services;
use crate::progress::ProgressError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetListImportQuery {
    pub list_key: String,
}

impl Request<Result<ListImportView, ProgressError>> for GetListImportQuery {}

/// A list that was never imported reports `not_started` rather than 404.
pub async fn handle(services: Services, query: GetListImportQuery) -> Result<ListImportView, ProgressError> {
    lists::import_view(&services, &query.list_key).await
}
