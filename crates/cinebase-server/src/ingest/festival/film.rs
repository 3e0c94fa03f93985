//! Film resolution for nominations
//!
//! Exact ids first, then fuzzy matching against local movies near the year,
//! then an external search with the year, repeated without it when that
//! finds nothing. An external match the store does not have yet becomes a
//! pending link and a fetch job.

use tracing::{debug, info};

use super::formats::ParsedNomination;
use crate::ingest::context::Services;
use crate::ingest::jobs::{FetchOrigin, JobArgs};
use crate::ingest::matching::{match_film, FilmCandidate, MatchResult};
use crate::queue::runner::JobError;
use crate::sources::{MovieCandidate, SourceError, SourceResult};
use crate::store::Movie;

#[derive(Debug, Clone, PartialEq)]
pub enum FilmResolution {
    Local { movie: Movie, via: &'static str },
    /// Known to the source but not stored yet; a fetch job is queued
    Pending { tmdb_id: i64, via: &'static str },
    Unresolved,
}

impl FilmResolution {
    pub fn movie_id(&self) -> Option<i64> {
        match self {
            FilmResolution::Local { movie, .. } => Some(movie.id),
            _ => None,
        }
    }

    pub fn pending_tmdb_id(&self) -> Option<i64> {
        match self {
            FilmResolution::Pending { tmdb_id, .. } => Some(*tmdb_id),
            _ => None,
        }
    }

    pub fn via(&self) -> &'static str {
        match self {
            FilmResolution::Local { via, .. } | FilmResolution::Pending { via, .. } => via,
            FilmResolution::Unresolved => "unresolved",
        }
    }
}

fn local_candidate(movie: Movie) -> FilmCandidate<Movie> {
    FilmCandidate {
        title: movie.title.clone(),
        original_title: movie.original_title.clone(),
        year: movie.year(),
        item: movie,
    }
}

fn external_candidate(candidate: MovieCandidate) -> FilmCandidate<i64> {
    FilmCandidate {
        year: candidate.year(),
        title: candidate.title,
        original_title: candidate.original_title,
        item: candidate.tmdb_id,
    }
}

/// Not-found answers from a search are an empty result, not a failure.
fn found(result: SourceResult<Vec<MovieCandidate>>) -> Result<Vec<MovieCandidate>, SourceError> {
    match result {
        Err(SourceError::NotFound(_)) => Ok(Vec::new()),
        other => other,
    }
}

/// Link to the stored movie for `tmdb_id`, or queue its fetch.
async fn by_tmdb_id(
    services: &Services,
    tmdb_id: i64,
    via: &'static str,
    festival: &str,
    year: i32,
) -> Result<FilmResolution, JobError> {
    if let Some(movie) = services.store.movie_by_tmdb_id(tmdb_id).await? {
        return Ok(FilmResolution::Local { movie, via });
    }
    services
        .enqueue(&JobArgs::FetchMovie {
            tmdb_id,
            origin: FetchOrigin::Festival {
                festival: festival.to_string(),
                year,
            },
        })
        .await?;
    debug!(tmdb_id, via, "Queued fetch for nominated film");
    Ok(FilmResolution::Pending { tmdb_id, via })
}

pub async fn resolve_film(
    services: &Services,
    festival: &str,
    ceremony_year: i32,
    nomination: &ParsedNomination,
) -> Result<FilmResolution, JobError> {
    let matching = &services.config.matching;
    let year = nomination.year.unwrap_or(ceremony_year);

    if let Some(imdb_id) = nomination.imdb_id.as_deref() {
        if let Some(movie) = services.store.movie_by_imdb_id(imdb_id).await? {
            return Ok(FilmResolution::Local { movie, via: "imdb_id" });
        }
        let found_ids = found(services.movies.find_by_imdb_id(imdb_id).await)?;
        if let [single] = found_ids.as_slice() {
            return by_tmdb_id(services, single.tmdb_id, "imdb_id", festival, ceremony_year).await;
        }
    }
    if let Some(tmdb_id) = nomination.tmdb_id {
        return by_tmdb_id(services, tmdb_id, "tmdb_id", festival, ceremony_year).await;
    }

    let local = services
        .store
        .movies_near_year(Some(year), matching.year_tolerance, matching.local_candidate_limit)
        .await?;
    match match_film(matching, &nomination.title, Some(year), local.into_iter().map(local_candidate)) {
        MatchResult::Accepted(scored) => {
            return Ok(FilmResolution::Local {
                movie: scored.item,
                via: "local_fuzzy",
            })
        },
        MatchResult::Ambiguous { best, runner_up } => {
            info!(
                title = %nomination.title,
                best = best.item.id,
                best_score = best.score,
                runner_up = runner_up.item.id,
                runner_up_score = runner_up.score,
                "Ambiguous local match rejected"
            );
        },
        MatchResult::NoMatch => {},
    }

    let mut hits = found(services.movies.search_movies(&nomination.title, Some(year)).await)?;
    let mut via = "search";
    if hits.is_empty() {
        hits = found(services.movies.search_movies(&nomination.title, None).await)?;
        via = "search_without_year";
    }
    match match_film(matching, &nomination.title, Some(year), hits.into_iter().map(external_candidate)) {
        MatchResult::Accepted(scored) => return by_tmdb_id(services, scored.item, via, festival, ceremony_year).await,
        MatchResult::Ambiguous { best, runner_up } => {
            info!(
                title = %nomination.title,
                best = best.item,
                runner_up = runner_up.item,
                via,
                "Ambiguous search match rejected"
            );
        },
        MatchResult::NoMatch => {},
    }

    debug!(title = %nomination.title, year, "No film match");
    Ok(FilmResolution::Unresolved)
}
