//! Gap routes
//!
//! - `GET /missing?min_popularity=&limit=&sort_by=` - missing movies, most popular first
//! - `GET /count?min_popularity=` - how many are missing

use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};

use super::queries::{MissingCountQuery, MissingCountResponse, MissingMoviesQuery, MissingMoviesResponse};
use crate::api::ApiResponse;
use crate::error::AppError;
use crate::ingest::Services;

pub fn gap_routes() -> Router<Services> {
    Router::new()
        .route("/missing", get(missing_movies))
        .route("/count", get(missing_count))
}

async fn missing_movies(
    State(services): State<Services>,
    Query(query): Query<MissingMoviesQuery>,
) -> Result<ApiResponse<MissingMoviesResponse>, AppError> {
    let response = super::queries::missing_movies::handle(services, query).await?;
    Ok(ApiResponse::success(response))
}

async fn missing_count(
    State(services): State<Services>,
    Query(query): Query<MissingCountQuery>,
) -> Result<ApiResponse<MissingCountResponse>, AppError> {
    let response = super::queries::missing_count::handle(services, query).await?;
    Ok(ApiResponse::success(response))
}
