//! Job routes
//!
//! - `GET /?worker=&queue=&state=&limit=` - list jobs
//! - `GET /counts?worker=&queue=` - counts per state
//! - `GET /:job_id` - one job with its attempt errors

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};

use super::queries::list_jobs::ListJobsError;
use super::queries::{CountJobsQuery, GetJobQuery, ListJobsQuery, ListJobsResponse};
use crate::api::ApiResponse;
use crate::error::AppError;
use crate::ingest::Services;
use crate::queue::{Job, StateCounts};

pub fn jobs_routes() -> Router<Services> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/counts", get(count_jobs))
        .route("/:job_id", get(get_job))
}

impl From<ListJobsError> for AppError {
    fn from(err: ListJobsError) -> Self {
        match err {
            ListJobsError::InvalidState(_) => AppError::Validation(err.to_string()),
            ListJobsError::Queue(e) => e.into(),
        }
    }
}

async fn list_jobs(
    State(services): State<Services>,
    Query(query): Query<ListJobsQuery>,
) -> Result<ApiResponse<ListJobsResponse>, AppError> {
    let response = super::queries::list_jobs::handle(services, query).await?;
    Ok(ApiResponse::success(response))
}

async fn count_jobs(
    State(services): State<Services>,
    Query(query): Query<CountJobsQuery>,
) -> Result<ApiResponse<StateCounts>, AppError> {
    let counts = super::queries::count_jobs::handle(services, query).await?;
    Ok(ApiResponse::success(counts))
}

async fn get_job(
    State(services): State<Services>,
    Path(job_id): Path<i64>,
) -> Result<ApiResponse<Job>, AppError> {
    let job = super::queries::get_job::handle(services, GetJobQuery { job_id }).await?;
    Ok(ApiResponse::success(job))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jobs_routes_build() {
        let _router = jobs_routes();
    }
}
