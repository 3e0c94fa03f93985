//! Missing movies query

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::gap::{find_missing_ids, GapError, GapQuery, MissingMovie, SortBy};
use crate::ingest::Services;

pub const DEFAULT_LIMIT: usize = 1000;
pub const MAX_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissingMoviesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_popularity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub sort_by: SortBy,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingMoviesResponse {
    pub movies: Vec<MissingMovie>,
    pub count: usize,
}

impl Request<Result<MissingMoviesResponse, GapError>> for MissingMoviesQuery {}

impl From<MissingMoviesQuery> for GapQuery {
    fn from(query: MissingMoviesQuery) -> Self {
        GapQuery {
            min_popularity: query.min_popularity,
            limit: Some(query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)),
            sort_by: query.sort_by,
        }
    }
}

#[tracing::instrument(skip(services))]
pub async fn handle(services: Services, query: MissingMoviesQuery) -> Result<MissingMoviesResponse, GapError> {
    let movies = find_missing_ids(&services, &query.into()).await?;
    Ok(MissingMoviesResponse {
        count: movies.len(),
        movies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_bounded() {
        let gap: GapQuery = MissingMoviesQuery::default().into();
        assert_eq!(gap.limit, Some(DEFAULT_LIMIT));

        let gap: GapQuery = MissingMoviesQuery {
            limit: Some(0),
            ..Default::default()
        }
        .into();
        assert_eq!(gap.limit, Some(1));
    }
}
