//! Gap analysis
//!
//! The set of movies the authoritative universe knows about and the local
//! store does not. Ids with a recorded permanent lookup failure are left
//! out, otherwise a backfill would re-queue them forever.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

use super::context::Services;
use crate::progress::{keys, ProgressError};
use crate::queue::runner::JobError;
use crate::sources::{SourceError, UniverseEntry};
use crate::store::{lookup_source, StoreError};

#[derive(Error, Debug)]
pub enum GapError {
    #[error("Id universe unavailable: {0}")]
    Universe(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl From<GapError> for JobError {
    fn from(err: GapError) -> Self {
        JobError::Retryable(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Most popular first; unknown popularity last, ties by ascending id
    #[default]
    PopularityDesc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GapQuery {
    /// Drop entries below this popularity, and entries without one
    pub min_popularity: Option<f64>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub sort_by: SortBy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingMovie {
    pub tmdb_id: i64,
    pub popularity: Option<f64>,
    pub title: Option<String>,
}

fn popularity_desc(a: &MissingMovie, b: &MissingMovie) -> Ordering {
    match (a.popularity, b.popularity) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then(a.tmdb_id.cmp(&b.tmdb_id))
}

fn admits(entry: &UniverseEntry, known: &HashSet<i64>, excluded: &HashSet<i64>, min_popularity: Option<f64>) -> bool {
    !known.contains(&entry.tmdb_id)
        && !excluded.contains(&entry.tmdb_id)
        && min_popularity.map_or(true, |min| entry.popularity.is_some_and(|p| p >= min))
}

/// Entries of `universe` not in `known` or `excluded`, filtered, sorted and
/// capped per `query`. Duplicate universe ids appear once.
pub fn compute_gap(
    universe: &[UniverseEntry],
    known: &HashSet<i64>,
    excluded: &HashSet<i64>,
    query: &GapQuery,
) -> Vec<MissingMovie> {
    let mut seen = HashSet::new();
    let mut missing: Vec<MissingMovie> = universe
        .iter()
        .filter(|e| admits(e, known, excluded, query.min_popularity))
        .filter(|e| seen.insert(e.tmdb_id))
        .map(|e| MissingMovie {
            tmdb_id: e.tmdb_id,
            popularity: e.popularity,
            title: e.title.clone(),
        })
        .collect();

    match query.sort_by {
        SortBy::PopularityDesc => missing.sort_unstable_by(popularity_desc),
    }
    if let Some(limit) = query.limit {
        missing.truncate(limit);
    }
    missing
}

/// Size of the gap without materializing it
pub fn count_gap(
    universe: &[UniverseEntry],
    known: &HashSet<i64>,
    excluded: &HashSet<i64>,
    min_popularity: Option<f64>,
) -> usize {
    universe
        .iter()
        .filter(|e| admits(e, known, excluded, min_popularity))
        .map(|e| e.tmdb_id)
        .collect::<HashSet<_>>()
        .len()
}

async fn excluded_ids(services: &Services) -> Result<HashSet<i64>, GapError> {
    Ok(services
        .store
        .failed_identifiers(lookup_source::TMDB_MOVIE)
        .await?
        .iter()
        .filter_map(|id| id.parse().ok())
        .collect())
}

/// Missing movies, most popular first. Snapshots the total missing count
/// and the universe baseline time to progress state.
pub async fn find_missing_ids(services: &Services, query: &GapQuery) -> Result<Vec<MissingMovie>, GapError> {
    let universe = services.universe.snapshot().await?;
    let known = services.store.known_tmdb_ids().await?;
    let excluded = excluded_ids(services).await?;

    let total = count_gap(&universe.entries, &known, &excluded, query.min_popularity);
    let missing = compute_gap(&universe.entries, &known, &excluded, query);

    services
        .progress
        .put(keys::GAP_MISSING_COUNT, serde_json::json!(total))
        .await?;
    services
        .progress
        .put(keys::UNIVERSE_BASELINE_AT, serde_json::json!(universe.baseline_at))
        .await?;

    info!(
        universe = universe.entries.len(),
        known = known.len(),
        excluded = excluded.len(),
        missing = total,
        returned = missing.len(),
        "Gap analysis complete"
    );
    Ok(missing)
}

/// Number of missing movies at or above `min_popularity`
pub async fn missing_count(services: &Services, min_popularity: Option<f64>) -> Result<usize, GapError> {
    let universe = services.universe.snapshot().await?;
    let known = services.store.known_tmdb_ids().await?;
    let excluded = excluded_ids(services).await?;
    let count = count_gap(&universe.entries, &known, &excluded, min_popularity);
    debug!(count, "Counted missing movies");
    Ok(count)
}
