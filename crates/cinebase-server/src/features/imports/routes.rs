//! Import routes
//!
//! - `POST /lists` - queue a curated list import
//! - `GET /lists/:list_key` - list import progress
//! - `POST /festivals/:festival` - queue specific ceremony years
//! - `POST /festivals/:festival/sync` - queue missing (or all) years
//! - `GET /festivals/:festival/:year` - progress of one year
//! - `POST /movies` - queue a one-off movie fetch

use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};

use super::commands::{FetchMovieCommand, ImportFestivalCommand, ImportListCommand, SyncFestivalCommand};
use super::queries::{FestivalYearProgress, GetFestivalYearQuery, GetListImportQuery};
use crate::api::ApiResponse;
use crate::error::AppError;
use crate::ingest::lists::ListImportView;
use crate::ingest::Services;

pub fn imports_routes() -> Router<Services> {
    Router::new()
        .route("/lists", post(import_list))
        .route("/lists/:list_key", get(get_list_import))
        .route("/festivals/:festival", post(import_festival))
        .route("/festivals/:festival/sync", post(sync_festival))
        .route("/festivals/:festival/:year", get(get_festival_year))
        .route("/movies", post(fetch_movie))
}

async fn import_list(
    State(services): State<Services>,
    Json(command): Json<ImportListCommand>,
) -> Result<Response, AppError> {
    let queued = super::commands::import_list::handle(services, command).await?;
    Ok(ApiResponse::success(queued).accepted())
}

async fn get_list_import(
    State(services): State<Services>,
    Path(list_key): Path<String>,
) -> Result<ApiResponse<ListImportView>, AppError> {
    let view = super::queries::get_list_import::handle(services, GetListImportQuery { list_key }).await?;
    Ok(ApiResponse::success(view))
}

async fn import_festival(
    State(services): State<Services>,
    Path(festival): Path<String>,
    Json(mut command): Json<ImportFestivalCommand>,
) -> Result<Response, AppError> {
    command.festival = festival;
    let queued = super::commands::import_festival::handle(services, command).await?;
    Ok(ApiResponse::success(queued).accepted())
}

async fn sync_festival(
    State(services): State<Services>,
    Path(festival): Path<String>,
    command: Option<Json<SyncFestivalCommand>>,
) -> Result<Response, AppError> {
    let mut command = command.map(|Json(c)| c).unwrap_or(SyncFestivalCommand {
        festival: String::new(),
        mode: Default::default(),
    });
    command.festival = festival;
    let queued = super::commands::sync_festival::handle(services, command).await?;
    Ok(ApiResponse::success(queued).accepted())
}

async fn get_festival_year(
    State(services): State<Services>,
    Path((festival, year)): Path<(String, i32)>,
) -> Result<ApiResponse<FestivalYearProgress>, AppError> {
    let progress = super::queries::get_festival_year::handle(services, GetFestivalYearQuery { festival, year }).await?;
    Ok(ApiResponse::success(progress))
}

async fn fetch_movie(
    State(services): State<Services>,
    Json(command): Json<FetchMovieCommand>,
) -> Result<Response, AppError> {
    let queued = super::commands::fetch_movie::handle(services, command).await?;
    Ok(ApiResponse::success(queued).accepted())
}
