//! Rate-limited fetch worker
//!
//! Imports one movie by TMDb id: admission against the store, a bounded
//! fetch, the full/soft quality branch, then post-processing for the origin
//! that queued it. Permanent source failures record a failed lookup and
//! cancel the job instead of retrying.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::context::Services;
use super::jobs::{FetchOrigin, JobArgs};
use super::quality::failed_criteria;
use crate::notify::{topics, ImportEvent};
use crate::queue::runner::{JobError, JobOutcome, JobResult};
use crate::sources::MovieDetails;
use crate::store::{
    lookup_source, CanonicalEntry, CreditKind, FailedLookup, ImportStatus, Movie, NewCredit, NewMovie, NewPerson,
};

/// What admission and import did with the movie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAction {
    Existing,
    ImportedFull,
    ImportedSoft,
}

impl FetchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchAction::Existing => "existing",
            FetchAction::ImportedFull => "imported_full",
            FetchAction::ImportedSoft => "imported_soft",
        }
    }
}

fn new_movie(details: &MovieDetails) -> NewMovie {
    NewMovie {
        tmdb_id: details.tmdb_id,
        imdb_id: details.imdb_id.clone(),
        title: details.title.clone(),
        original_title: details.original_title.clone(),
        release_date: details.release_date,
        popularity: details.popularity,
        vote_count: details.vote_count,
        runtime: details.runtime,
        genres: details.genres.clone(),
    }
}

fn credits(details: &MovieDetails) -> Vec<NewCredit> {
    let cast = details.cast.iter().map(|c| NewCredit {
        person: NewPerson {
            tmdb_id: Some(c.tmdb_id),
            imdb_id: c.imdb_id.clone(),
            name: c.name.clone(),
            popularity: c.popularity,
        },
        kind: CreditKind::Cast,
        role: c.character.clone().unwrap_or_default(),
        department: None,
        order: c.order,
    });
    let crew = details.crew.iter().map(|c| NewCredit {
        person: NewPerson {
            tmdb_id: Some(c.tmdb_id),
            imdb_id: c.imdb_id.clone(),
            name: c.name.clone(),
            popularity: c.popularity,
        },
        kind: CreditKind::Crew,
        role: c.job.clone(),
        department: c.department.clone(),
        order: None,
    });
    cast.chain(crew).collect()
}

#[instrument(skip(services, origin), fields(origin = ?origin))]
pub async fn fetch_movie(services: &Services, tmdb_id: i64, origin: &FetchOrigin) -> JobResult {
    if let Some(movie) = services.store.movie_by_tmdb_id(tmdb_id).await? {
        debug!(movie_id = movie.id, "Movie already stored, post-processing only");
        post_process(services, &movie, origin, FetchAction::Existing).await?;
        return Ok(outcome(&movie, FetchAction::Existing));
    }

    let timeout = services.config.fetch.timeout();
    let details = match tokio::time::timeout(timeout, services.movies.get_movie(tmdb_id)).await {
        Err(_) => {
            return Err(JobError::retryable(format!(
                "fetching movie {} timed out after {}s",
                tmdb_id,
                timeout.as_secs()
            )))
        },
        Ok(Err(e)) if e.is_permanent() => {
            warn!(error = %e, "Movie unavailable at source");
            services
                .store
                .record_failed_lookup(FailedLookup {
                    source: lookup_source::TMDB_MOVIE.to_string(),
                    identifier: tmdb_id.to_string(),
                    reason: e.to_string(),
                    context: json!({ "origin": origin }),
                })
                .await?;
            return Ok(JobOutcome::Cancel(format!("no data available: {}", e)));
        },
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(details)) => details,
    };

    let failed = failed_criteria(&services.config.quality, &details);
    let (movie, action) = if failed.is_empty() {
        let movie = services
            .store
            .insert_full_movie(new_movie(&details), credits(&details))
            .await?;
        (movie, FetchAction::ImportedFull)
    } else {
        debug!(failed = ?failed, "Movie fails quality criteria, soft import");
        let movie = services.store.insert_soft_movie(new_movie(&details), failed).await?;
        (movie, FetchAction::ImportedSoft)
    };

    info!(
        movie_id = movie.id,
        title = %movie.title,
        status = %movie.import_status,
        "Imported movie"
    );
    services.notify(
        topics::MOVIES,
        ImportEvent::MovieImported {
            tmdb_id,
            movie_id: movie.id,
            import_status: movie.import_status.to_string(),
        },
    );

    post_process(services, &movie, origin, action).await?;
    Ok(outcome(&movie, action))
}

fn outcome(movie: &Movie, action: FetchAction) -> JobOutcome {
    JobOutcome::Complete(json!({
        "tmdb_id": movie.tmdb_id,
        "movie_id": movie.id,
        "action": action.as_str(),
        "import_status": movie.import_status,
        "failed_criteria": movie.failed_criteria,
    }))
}

/// Origin-specific writes, then non-critical fan-out for fresh full imports.
async fn post_process(services: &Services, movie: &Movie, origin: &FetchOrigin, action: FetchAction) -> Result<(), JobError> {
    match origin {
        FetchOrigin::CanonicalList {
            list_key,
            import_id,
            position,
        } => {
            let entry = CanonicalEntry {
                import_id: *import_id,
                position: *position,
                added_at: Utc::now(),
            };
            if services.store.mark_canonical(movie.id, list_key, entry).await? {
                debug!(movie_id = movie.id, list_key = %list_key, "Tagged list membership");
            }
        },
        FetchOrigin::Festival { festival, year } => {
            let resolved = services
                .store
                .resolve_pending_nominations(movie.tmdb_id, movie.id)
                .await?;
            if resolved > 0 {
                info!(festival = %festival, year, resolved, "Linked pending nominations");
            }
        },
        FetchOrigin::Backfill | FetchOrigin::Manual => {},
    }

    if action == FetchAction::ImportedFull && movie.import_status == ImportStatus::Full {
        if services.config.fetch.enrich && movie.imdb_id.is_some() {
            fan_out(services, JobArgs::EnrichMovie { movie_id: movie.id }).await;
        }
        fan_out(services, JobArgs::UpdateCollaborations { movie_id: movie.id }).await;
    }
    Ok(())
}

async fn fan_out(services: &Services, args: JobArgs) {
    if let Err(e) = services.enqueue(&args).await {
        warn!(worker = args.worker(), error = %e, "Failed to enqueue follow-up job");
    }
}
