//! Festival discovery
//!
//! Imports ceremony years: fetch the event document, parse it, reconcile each
//! nomination's film and people with the store, and insert nominations that
//! are not already recorded. Films the store lacks are linked by TMDb id and
//! fetched through the regular fetch worker, which resolves the link once the
//! movie lands.

pub mod film;
pub mod formats;
pub mod person;

use chrono::{Datelike, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use super::config::FestivalSpec;
use super::context::Services;
use super::jobs::{FestivalAction, JobArgs};
use super::ImportError;
use crate::notify::{topics, ImportEvent};
use crate::progress::{self, keys, ProgressError};
use crate::queue::runner::{JobError, JobOutcome, JobResult};
use crate::queue::InsertResult;
use crate::sources::SourceError;
use crate::store::{NewNomination, NominationWrite, StoreError};
use cinebase_common::text::normalize_title;

pub use film::{resolve_film, FilmResolution};
pub use formats::{parse_ceremony, CeremonyFormat, FormatError, ParsedCeremony, ParsedNomination, ParsedPerson};
pub use person::{resolve_person, PersonResolution};

/// Years per queued multi-year job
pub const YEARS_PER_JOB: usize = 10;

#[derive(Error, Debug)]
pub enum FestivalError {
    #[error("Unknown festival '{0}'")]
    UnknownFestival(String),

    #[error("Ceremony source failed: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error("Import of {festival} {year} timed out")]
    Timeout { festival: String, year: i32 },

    #[error("{0}")]
    Job(JobError),
}

impl From<JobError> for FestivalError {
    fn from(err: JobError) -> Self {
        FestivalError::Job(err)
    }
}

impl FestivalError {
    pub fn is_permanent(&self) -> bool {
        match self {
            FestivalError::UnknownFestival(_) | FestivalError::Format(_) => true,
            FestivalError::Source(e) => e.is_permanent(),
            FestivalError::Job(e) => matches!(e, JobError::Permanent(_)),
            _ => false,
        }
    }
}

impl From<FestivalError> for JobError {
    fn from(err: FestivalError) -> Self {
        match err {
            FestivalError::Job(e) => e,
            e if e.is_permanent() => JobError::Permanent(e.to_string()),
            e => JobError::Retryable(e.to_string()),
        }
    }
}

/// Outcome of importing one ceremony year
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct YearSummary {
    pub festival: String,
    pub year: i32,
    pub format: String,
    /// Nominations found in the document
    pub parsed: usize,
    pub inserted: usize,
    /// Earlier rows that gained a movie, TMDb id or real person
    pub upgraded: usize,
    pub duplicates: usize,
    pub linked: usize,
    pub pending: usize,
    pub unresolved: usize,
    pub placeholders: usize,
}

fn festival_spec<'a>(services: &'a Services, festival: &str) -> Result<&'a FestivalSpec, FestivalError> {
    services
        .config
        .festivals
        .get(festival)
        .ok_or_else(|| FestivalError::UnknownFestival(festival.to_string()))
}

/// Nomination rows for one parsed nomination: one per credited person, or a
/// single film-only row.
async fn nomination_rows(
    services: &Services,
    ceremony_id: i64,
    nomination: &ParsedNomination,
    resolution: &FilmResolution,
    summary: &mut YearSummary,
) -> Result<Vec<NewNomination>, FestivalError> {
    let film_title = match resolution {
        FilmResolution::Local { movie, .. } => movie.title.as_str(),
        _ => nomination.title.as_str(),
    };
    let base = NewNomination {
        ceremony_id,
        category: nomination.category.clone(),
        won: nomination.won,
        movie_id: resolution.movie_id(),
        pending_tmdb_id: resolution.pending_tmdb_id(),
        person_id: None,
        raw_title: nomination.title.clone(),
        normalized_title: normalize_title(&nomination.title),
        raw_person: None,
    };
    if nomination.people.is_empty() {
        return Ok(vec![base]);
    }

    let mut rows = Vec::with_capacity(nomination.people.len());
    for person in &nomination.people {
        let resolved = resolve_person(services, person, resolution.movie_id(), Some(film_title)).await?;
        if resolved.is_placeholder() {
            summary.placeholders += 1;
        }
        rows.push(NewNomination {
            person_id: Some(resolved.person.id),
            raw_person: Some(person.name.clone()),
            ..base.clone()
        });
    }
    Ok(rows)
}

/// Import one ceremony year. Safe to repeat: nominations already recorded
/// are skipped, or upgraded when this run resolves them further.
#[instrument(skip(services))]
pub async fn import_year(services: &Services, festival: &str, year: i32) -> Result<YearSummary, FestivalError> {
    let spec = festival_spec(services, festival)?;
    let body = services.ceremonies.fetch_ceremony(&spec.event_id, year).await?;
    let parsed = parse_ceremony(&body)?;
    let ceremony = services
        .store
        .upsert_ceremony(festival, year, parsed.format.as_str())
        .await?;

    let mut summary = YearSummary {
        festival: festival.to_string(),
        year,
        format: parsed.format.to_string(),
        parsed: parsed.nominations.len(),
        ..Default::default()
    };

    for nomination in &parsed.nominations {
        let resolution = resolve_film(services, festival, year, nomination).await?;
        match resolution {
            FilmResolution::Local { .. } => summary.linked += 1,
            FilmResolution::Pending { .. } => summary.pending += 1,
            FilmResolution::Unresolved => summary.unresolved += 1,
        }
        for row in nomination_rows(services, ceremony.id, nomination, &resolution, &mut summary).await? {
            match services.store.insert_nomination(row).await? {
                NominationWrite::Inserted(_) => summary.inserted += 1,
                NominationWrite::Upgraded(_) => summary.upgraded += 1,
                NominationWrite::Duplicate => summary.duplicates += 1,
            }
        }
    }

    progress::write(
        services.progress.as_ref(),
        &keys::festival_import(festival, year),
        &json!({"status": "completed", "summary": summary, "at": Utc::now()}),
    )
    .await?;
    info!(
        format = %summary.format,
        parsed = summary.parsed,
        inserted = summary.inserted,
        upgraded = summary.upgraded,
        duplicates = summary.duplicates,
        pending = summary.pending,
        unresolved = summary.unresolved,
        "Imported ceremony"
    );
    services.notify(
        topics::FESTIVAL_IMPORT,
        ImportEvent::FestivalImported {
            festival: festival.to_string(),
            year,
            nominations: summary.inserted,
            unresolved: summary.unresolved,
        },
    );
    Ok(summary)
}

async fn record_failure(services: &Services, festival: &str, year: i32, err: &FestivalError) {
    let reason = err.to_string();
    if let Err(e) = progress::write(
        services.progress.as_ref(),
        &keys::festival_import(festival, year),
        &json!({"status": "failed", "reason": reason, "at": Utc::now()}),
    )
    .await
    {
        warn!(festival, year, error = %e, "Failed to record festival import failure");
    }
    services.notify(
        topics::FESTIVAL_IMPORT,
        ImportEvent::FestivalImportFailed {
            festival: festival.to_string(),
            year,
            reason,
        },
    );
}

/// Import many years with bounded concurrency and a timeout per year.
/// Years that fail transiently are re-queued as single-year jobs.
#[instrument(skip(services, years), fields(years = years.len()))]
pub async fn import_years(services: &Services, festival: &str, years: &[i32]) -> JobResult {
    festival_spec(services, festival)?;
    let timeout = services.config.festivals.year_timeout();
    let concurrency = services.config.festivals.concurrency.max(1);

    let results: Vec<(i32, Result<YearSummary, FestivalError>)> = stream::iter(years.iter().copied())
        .map(|year| async move {
            let result = match tokio::time::timeout(timeout, import_year(services, festival, year)).await {
                Ok(result) => result,
                Err(_) => Err(FestivalError::Timeout {
                    festival: festival.to_string(),
                    year,
                }),
            };
            (year, result)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut imported = Vec::new();
    let mut failed = Vec::new();
    let mut requeued = Vec::new();
    for (year, result) in results {
        match result {
            Ok(summary) => imported.push(summary),
            Err(e) => {
                error!(festival, year, error = %e, "Ceremony import failed");
                record_failure(services, festival, year, &e).await;
                if !e.is_permanent() {
                    let retry = JobArgs::Festival(FestivalAction::ImportYear {
                        festival: festival.to_string(),
                        year,
                    });
                    services.enqueue(&retry).await?;
                    requeued.push(year);
                }
                failed.push(year);
            },
        }
    }
    imported.sort_by_key(|s| s.year);
    failed.sort_unstable();
    requeued.sort_unstable();

    Ok(JobOutcome::Complete(json!({
        "festival": festival,
        "imported": imported,
        "failed": failed,
        "requeued": requeued,
    })))
}

fn current_year() -> i32 {
    Utc::now().year()
}

/// Queue multi-year jobs covering `years`, a chunk per job.
async fn queue_year_chunks(services: &Services, festival: &str, years: &[i32]) -> Result<usize, JobError> {
    let mut queued = 0;
    for chunk in years.chunks(YEARS_PER_JOB) {
        let args = JobArgs::Festival(FestivalAction::ImportYears {
            festival: festival.to_string(),
            years: chunk.to_vec(),
        });
        if !services.enqueue(&args).await?.conflict {
            queued += 1;
        }
    }
    Ok(queued)
}

/// Whether the last import of `year` ran to completion. A ceremony row alone
/// is not enough: it is written before the nominations are processed.
async fn year_completed(services: &Services, festival: &str, year: i32) -> Result<bool, FestivalError> {
    let recorded = services.progress.get(&keys::festival_import(festival, year)).await?;
    Ok(recorded
        .as_ref()
        .and_then(|value| value.get("status"))
        .and_then(|status| status.as_str())
        == Some("completed"))
}

/// Queue every configured year whose import has not completed.
#[instrument(skip(services))]
pub async fn sync_missing(services: &Services, festival: &str) -> JobResult {
    let spec = festival_spec(services, festival)?;
    let mut missing = Vec::new();
    for year in spec.first_year..=current_year() {
        if !year_completed(services, festival, year).await? {
            missing.push(year);
        }
    }
    let jobs = queue_year_chunks(services, festival, &missing).await?;
    info!(missing = missing.len(), jobs, "Queued missing ceremony years");
    Ok(JobOutcome::Complete(json!({"missing_years": missing, "jobs": jobs})))
}

/// Re-import every stored ceremony year.
#[instrument(skip(services))]
pub async fn resync_all(services: &Services, festival: &str) -> JobResult {
    festival_spec(services, festival)?;
    let years = services.store.ceremony_years(festival).await?;
    let jobs = queue_year_chunks(services, festival, &years).await?;
    info!(years = years.len(), jobs, "Queued ceremony resync");
    Ok(JobOutcome::Complete(json!({"years": years, "jobs": jobs})))
}

/// Run one festival job.
pub async fn run(services: &Services, action: &FestivalAction) -> JobResult {
    match action {
        FestivalAction::ImportYear { festival, year } => match import_year(services, festival, *year).await {
            Ok(summary) => Ok(JobOutcome::Complete(json!(summary))),
            Err(e) => {
                if e.is_permanent() {
                    record_failure(services, festival, *year, &e).await;
                }
                Err(e.into())
            },
        },
        FestivalAction::ImportYears { festival, years } => import_years(services, festival, years).await,
        FestivalAction::SyncMissing { festival } => sync_missing(services, festival).await,
        FestivalAction::ResyncAll { festival } => resync_all(services, festival).await,
    }
}

fn check_festival(services: &Services, festival: &str) -> Result<(), ImportError> {
    festival_spec(services, festival)
        .map(|_| ())
        .map_err(|_| ImportError::UnknownFestival(festival.to_string()))
}

/// Queue an import of `years` for a configured festival.
pub async fn queue_import(services: &Services, festival: &str, years: &[i32]) -> Result<InsertResult, ImportError> {
    let spec = festival_spec(services, festival).map_err(|_| ImportError::UnknownFestival(festival.to_string()))?;
    let latest = current_year();
    if let Some(year) = years.iter().find(|y| **y < spec.first_year || **y > latest) {
        return Err(ImportError::InvalidYear {
            festival: festival.to_string(),
            year: *year,
        });
    }
    let action = match years {
        [] => return Err(ImportError::NoYears),
        [year] => FestivalAction::ImportYear {
            festival: festival.to_string(),
            year: *year,
        },
        many => {
            let mut years = many.to_vec();
            years.sort_unstable();
            years.dedup();
            FestivalAction::ImportYears {
                festival: festival.to_string(),
                years,
            }
        },
    };
    Ok(services.enqueue(&JobArgs::Festival(action)).await?)
}

pub async fn queue_sync_missing(services: &Services, festival: &str) -> Result<InsertResult, ImportError> {
    check_festival(services, festival)?;
    let action = FestivalAction::SyncMissing {
        festival: festival.to_string(),
    };
    Ok(services.enqueue(&JobArgs::Festival(action)).await?)
}

pub async fn queue_resync_all(services: &Services, festival: &str) -> Result<InsertResult, ImportError> {
    check_festival(services, festival)?;
    let action = FestivalAction::ResyncAll {
        festival: festival.to_string(),
    };
    Ok(services.enqueue(&JobArgs::Festival(action)).await?)
}
