//! Backfill routes
//!
//! - `GET /` - current status
//! - `POST /start` - start a new run
//! - `POST /stop` - pause the loop
//! - `POST /resume` - continue a paused run
//! - `POST /health` - repair a running loop with no live job

use axum::{extract::State, routing::{get, post}, Json, Router};

use super::commands::{ResumeBackfillCommand, StartBackfillCommand, StopBackfillCommand};
use super::queries::{BackfillHealthQuery, GetBackfillStatusQuery};
use crate::api::ApiResponse;
use crate::error::AppError;
use crate::ingest::{BackfillReport, HealthReport, Services};

pub fn backfill_routes() -> Router<Services> {
    Router::new()
        .route("/", get(get_status))
        .route("/start", post(start_backfill))
        .route("/stop", post(stop_backfill))
        .route("/resume", post(resume_backfill))
        .route("/health", post(health_check))
}

async fn get_status(State(services): State<Services>) -> Result<ApiResponse<BackfillReport>, AppError> {
    let report = super::queries::get_status::handle(services, GetBackfillStatusQuery).await?;
    Ok(ApiResponse::success(report))
}

/// `POST /start` with an optional `{"batch_size", "min_popularity"}` body
async fn start_backfill(
    State(services): State<Services>,
    command: Option<Json<StartBackfillCommand>>,
) -> Result<ApiResponse<BackfillReport>, AppError> {
    let command = command.map(|Json(c)| c).unwrap_or_default();
    let report = super::commands::start::handle(services, command).await?;
    tracing::info!(batch_size = ?report.batch_size, "Backfill started via API");
    Ok(ApiResponse::success(report))
}

async fn stop_backfill(State(services): State<Services>) -> Result<ApiResponse<BackfillReport>, AppError> {
    let report = super::commands::stop::handle(services, StopBackfillCommand).await?;
    Ok(ApiResponse::success(report))
}

async fn resume_backfill(State(services): State<Services>) -> Result<ApiResponse<BackfillReport>, AppError> {
    let report = super::commands::resume::handle(services, ResumeBackfillCommand).await?;
    Ok(ApiResponse::success(report))
}

async fn health_check(State(services): State<Services>) -> Result<ApiResponse<HealthReport>, AppError> {
    let report = super::queries::health::handle(services, BackfillHealthQuery).await?;
    Ok(ApiResponse::success(report))
}
