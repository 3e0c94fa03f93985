//! Job arguments
//!
//! Every job the pipeline enqueues is a [`JobArgs`] variant. The queue stores
//! the variant name as the job's worker and the fields as its JSON args;
//! [`JobArgs::decode`] turns a claimed job back into the typed value once,
//! before dispatch, so workers never check for optional keys.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::config::queues;
use crate::queue::{Job, NewJob, UniqueOpts};

pub mod workers {
    pub const FETCH_MOVIE: &str = "fetch_movie";
    pub const ENRICH_MOVIE: &str = "enrich_movie";
    pub const UPDATE_COLLABORATIONS: &str = "update_collaborations";
    pub const LIST_IMPORT: &str = "list_import";
    pub const LIST_PAGE: &str = "list_page";
    pub const LIST_COMPLETION: &str = "list_completion";
    pub const BACKFILL: &str = "backfill";
    pub const FESTIVAL: &str = "festival";
}

/// Why a movie is being fetched, which decides its post-processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchOrigin {
    Backfill,
    CanonicalList {
        list_key: String,
        import_id: i64,
        position: Option<i32>,
    },
    Festival {
        festival: String,
        year: i32,
    },
    #[default]
    Manual,
}

impl FetchOrigin {
    fn unique_suffix(&self) -> String {
        match self {
            FetchOrigin::Backfill => "backfill".to_string(),
            FetchOrigin::CanonicalList { list_key, .. } => format!("list:{}", list_key),
            FetchOrigin::Festival { festival, year } => format!("festival:{}:{}", festival, year),
            FetchOrigin::Manual => "manual".to_string(),
        }
    }

    fn priority(&self) -> i32 {
        match self {
            FetchOrigin::Manual => 0,
            FetchOrigin::CanonicalList { .. } | FetchOrigin::Festival { .. } => 1,
            FetchOrigin::Backfill => 3,
        }
    }
}

/// Steps of the continuous backfill loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum BackfillStep {
    QueueBatch {
        batch_size: usize,
        min_popularity: Option<f64>,
    },
    CheckCompletion {
        batch_size: usize,
        min_popularity: Option<f64>,
    },
}

impl BackfillStep {
    pub fn name(&self) -> &'static str {
        match self {
            BackfillStep::QueueBatch { .. } => "queue_batch",
            BackfillStep::CheckCompletion { .. } => "check_completion",
        }
    }
}

/// Festival worker actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FestivalAction {
    ImportYear { festival: String, year: i32 },
    ImportYears { festival: String, years: Vec<i32> },
    SyncMissing { festival: String },
    ResyncAll { festival: String },
}

impl FestivalAction {
    pub fn festival(&self) -> &str {
        match self {
            FestivalAction::ImportYear { festival, .. }
            | FestivalAction::ImportYears { festival, .. }
            | FestivalAction::SyncMissing { festival }
            | FestivalAction::ResyncAll { festival } => festival,
        }
    }

    fn unique_key(&self) -> String {
        match self {
            FestivalAction::ImportYear { festival, year } => format!("festival:{}:{}", festival, year),
            FestivalAction::ImportYears { festival, years } => {
                let years: Vec<String> = years.iter().map(i32::to_string).collect();
                format!("festival:{}:years:{}", festival, years.join(","))
            },
            FestivalAction::SyncMissing { festival } => format!("festival:{}:sync_missing", festival),
            FestivalAction::ResyncAll { festival } => format!("festival:{}:resync_all", festival),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "worker", content = "args", rename_all = "snake_case")]
pub enum JobArgs {
    FetchMovie {
        tmdb_id: i64,
        #[serde(default)]
        origin: FetchOrigin,
    },
    EnrichMovie {
        movie_id: i64,
    },
    UpdateCollaborations {
        movie_id: i64,
    },
    ListImport {
        list_key: String,
        list_id: String,
    },
    ListPage {
        list_key: String,
        list_id: String,
        page: u32,
        import_id: i64,
    },
    ListCompletion {
        list_key: String,
        import_id: i64,
        total_pages: u32,
        check: u32,
    },
    Backfill(BackfillStep),
    Festival(FestivalAction),
}

#[derive(Debug, thiserror::Error)]
#[error("Cannot decode args for worker '{worker}': {source}")]
pub struct DecodeError {
    pub worker: String,
    #[source]
    pub source: serde_json::Error,
}

impl JobArgs {
    pub fn worker(&self) -> &'static str {
        match self {
            JobArgs::FetchMovie { .. } => workers::FETCH_MOVIE,
            JobArgs::EnrichMovie { .. } => workers::ENRICH_MOVIE,
            JobArgs::UpdateCollaborations { .. } => workers::UPDATE_COLLABORATIONS,
            JobArgs::ListImport { .. } => workers::LIST_IMPORT,
            JobArgs::ListPage { .. } => workers::LIST_PAGE,
            JobArgs::ListCompletion { .. } => workers::LIST_COMPLETION,
            JobArgs::Backfill(_) => workers::BACKFILL,
            JobArgs::Festival(_) => workers::FESTIVAL,
        }
    }

    pub fn queue(&self) -> &'static str {
        match self {
            JobArgs::FetchMovie { .. } => queues::FETCH,
            JobArgs::EnrichMovie { .. } | JobArgs::UpdateCollaborations { .. } => queues::ENRICH,
            JobArgs::ListImport { .. } | JobArgs::ListPage { .. } | JobArgs::ListCompletion { .. } => queues::LISTS,
            JobArgs::Backfill(_) => queues::BACKFILL,
            JobArgs::Festival(_) => queues::FESTIVALS,
        }
    }

    /// JSON args as stored on the job
    pub fn args(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove("args").unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Build the queue insert with this variant's queue, uniqueness,
    /// priority and attempt budget.
    pub fn to_new_job(&self) -> NewJob {
        let job = NewJob::new(self.queue(), self.worker(), self.args());
        match self {
            JobArgs::FetchMovie { tmdb_id, origin } => job
                .priority(origin.priority())
                .max_attempts(10)
                .unique(UniqueOpts::while_pending(format!(
                    "movie:{}:{}",
                    tmdb_id,
                    origin.unique_suffix()
                ))),
            JobArgs::EnrichMovie { movie_id } => job
                .max_attempts(5)
                .unique(UniqueOpts::while_pending(format!("movie:{}", movie_id))),
            JobArgs::UpdateCollaborations { movie_id } => job
                .max_attempts(5)
                .unique(UniqueOpts::while_pending(format!("movie:{}", movie_id))),
            JobArgs::ListImport { list_key, .. } => job
                .max_attempts(3)
                .unique(UniqueOpts::while_pending(format!("list:{}", list_key))),
            JobArgs::ListPage { import_id, page, .. } => job
                .max_attempts(10)
                .unique(UniqueOpts::while_pending(format!("import:{}:page:{}", import_id, page))),
            JobArgs::ListCompletion { import_id, .. } => job
                .max_attempts(5)
                .unique(UniqueOpts::while_waiting(format!("import:{}", import_id))),
            JobArgs::Backfill(step) => job
                .max_attempts(5)
                .unique(UniqueOpts::while_waiting(format!("backfill:{}", step.name()))),
            JobArgs::Festival(action) => job
                .max_attempts(5)
                .unique(UniqueOpts::while_pending(action.unique_key())),
        }
    }

    /// Same as [`JobArgs::to_new_job`], scheduled after `delay`.
    pub fn to_new_job_in(&self, delay: Duration) -> NewJob {
        self.to_new_job().schedule_in(delay)
    }

    pub fn decode(job: &Job) -> Result<Self, DecodeError> {
        serde_json::from_value(json!({"worker": job.worker, "args": job.args})).map_err(|source| DecodeError {
            worker: job.worker.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::JobState;
    use chrono::Utc;

    fn job_for(args: &JobArgs) -> Job {
        let new = args.to_new_job();
        Job {
            id: 1,
            queue: new.queue,
            worker: new.worker,
            args: new.args,
            state: JobState::Executing,
            attempt: 1,
            max_attempts: new.max_attempts,
            priority: new.priority,
            unique_key: new.unique.map(|u| u.key),
            meta: json!({}),
            errors: vec![],
            attempted_by: None,
            scheduled_at: Utc::now(),
            inserted_at: Utc::now(),
            attempted_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_decode_every_variant() {
        let variants = vec![
            JobArgs::FetchMovie {
                tmdb_id: 580175,
                origin: FetchOrigin::CanonicalList {
                    list_key: "criterion".into(),
                    import_id: 9,
                    position: Some(3),
                },
            },
            JobArgs::EnrichMovie { movie_id: 1 },
            JobArgs::UpdateCollaborations { movie_id: 1 },
            JobArgs::ListImport {
                list_key: "criterion".into(),
                list_id: "8250".into(),
            },
            JobArgs::ListPage {
                list_key: "criterion".into(),
                list_id: "8250".into(),
                page: 2,
                import_id: 9,
            },
            JobArgs::ListCompletion {
                list_key: "criterion".into(),
                import_id: 9,
                total_pages: 3,
                check: 0,
            },
            JobArgs::Backfill(BackfillStep::QueueBatch {
                batch_size: 500,
                min_popularity: Some(1.5),
            }),
            JobArgs::Festival(FestivalAction::ImportYears {
                festival: "cannes".into(),
                years: vec![2018, 2019],
            }),
        ];

        for args in variants {
            let job = job_for(&args);
            assert_eq!(job.worker, args.worker());
            assert_eq!(JobArgs::decode(&job).unwrap(), args);
        }
    }

    #[test]
    fn test_stored_args_are_flat() {
        let args = JobArgs::ListPage {
            list_key: "criterion".into(),
            list_id: "8250".into(),
            page: 2,
            import_id: 9,
        };
        assert_eq!(
            args.args(),
            json!({"list_key": "criterion", "list_id": "8250", "page": 2, "import_id": 9})
        );

        let step = JobArgs::Backfill(BackfillStep::CheckCompletion {
            batch_size: 10,
            min_popularity: None,
        });
        assert_eq!(step.args()["step"], "check_completion");
    }

    #[test]
    fn test_fetch_uniqueness_is_per_origin() {
        let backfill = JobArgs::FetchMovie {
            tmdb_id: 7,
            origin: FetchOrigin::Backfill,
        }
        .to_new_job();
        let festival = JobArgs::FetchMovie {
            tmdb_id: 7,
            origin: FetchOrigin::Festival {
                festival: "cannes".into(),
                year: 2019,
            },
        }
        .to_new_job();

        assert_ne!(backfill.unique.map(|u| u.key), festival.unique.as_ref().map(|u| u.key.clone()));
        assert!(festival.priority < 3);
    }

    #[test]
    fn test_unknown_worker_fails_to_decode() {
        let mut job = job_for(&JobArgs::EnrichMovie { movie_id: 1 });
        job.worker = "reticulate_splines".into();
        assert!(JobArgs::decode(&job).is_err());

        let mut job = job_for(&JobArgs::EnrichMovie { movie_id: 1 });
        job.args = json!({"movie": "one"});
        assert!(JobArgs::decode(&job).is_err());
    }

    #[test]
    fn test_missing_origin_defaults_to_manual() {
        let mut job = job_for(&JobArgs::FetchMovie {
            tmdb_id: 1,
            origin: FetchOrigin::Backfill,
        });
        job.args = json!({"tmdb_id": 1});
        assert_eq!(
            JobArgs::decode(&job).unwrap(),
            JobArgs::FetchMovie {
                tmdb_id: 1,
                origin: FetchOrigin::Manual
            }
        );
    }
}
