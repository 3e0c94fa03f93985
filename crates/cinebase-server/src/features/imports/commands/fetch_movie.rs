//! Fetch movie command

use cinebase_common::TmdbId;
use mediator::Request;
use serde::{Deserialize, Serialize};

use super::super::QueuedJob;
use crate::ingest::{queue_fetch, ImportError, Services};

/// Queue a one-off fetch by TMDb id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchMovieCommand {
    pub tmdb_id: i64,
}

impl Request<Result<QueuedJob, ImportError>> for FetchMovieCommand {}

#[tracing::instrument(skip(services))]
pub async fn handle(services: Services, command: FetchMovieCommand) -> Result<QueuedJob, ImportError> {
    let tmdb_id = TmdbId::new(command.tmdb_id).map_err(|e| ImportError::Invalid(e.to_string()))?;
    let result = queue_fetch(&services, tmdb_id.get()).await?;
    Ok(result.into())
}
