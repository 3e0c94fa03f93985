//! Routes claimed jobs to their workers

use async_trait::async_trait;
use tracing::error;

use super::context::Services;
use super::jobs::JobArgs;
use super::{backfill, enrich, festival, fetch, lists};
use crate::queue::runner::{JobError, JobExecutor, JobResult};
use crate::queue::Job;

pub struct Dispatcher {
    services: Services,
}

impl Dispatcher {
    pub fn new(services: Services) -> Self {
        Self { services }
    }
}

#[async_trait]
impl JobExecutor for Dispatcher {
    async fn execute(&self, job: &Job) -> JobResult {
        let args = match JobArgs::decode(job) {
            Ok(args) => args,
            Err(e) => {
                error!(job_id = job.id, error = %e, "Undecodable job");
                return Err(JobError::permanent(e));
            },
        };
        let services = &self.services;

        match &args {
            JobArgs::FetchMovie { tmdb_id, origin } => fetch::fetch_movie(services, *tmdb_id, origin).await,
            JobArgs::EnrichMovie { movie_id } => enrich::enrich_movie(services, *movie_id).await,
            JobArgs::UpdateCollaborations { movie_id } => enrich::update_collaborations(services, *movie_id).await,
            JobArgs::ListImport { list_key, list_id } => lists::orchestrate(services, job.id, list_key, list_id).await,
            JobArgs::ListPage {
                list_key,
                list_id,
                page,
                import_id,
            } => lists::process_page(services, list_key, list_id, *page, *import_id).await,
            JobArgs::ListCompletion {
                list_key,
                import_id,
                total_pages,
                check,
            } => lists::check_completion(services, list_key, *import_id, *total_pages, *check).await,
            JobArgs::Backfill(step) => backfill::run_step(services, step).await,
            JobArgs::Festival(action) => festival::run(services, action).await,
        }
    }
}

