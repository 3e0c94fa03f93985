//! Shared handles for workers

use std::sync::Arc;

use super::config::IngestConfig;
use super::jobs::JobArgs;
use crate::notify::{ImportEvent, Notifier};
use crate::progress::ProgressStore;
use crate::queue::{InsertResult, JobQueue, QueueResult};
use crate::sources::{CeremonySource, IdUniverse, ListSource, MovieSource, RatingsSource};
use crate::store::MovieStore;

/// Everything a worker may touch, injected once at startup
#[derive(Clone)]
pub struct Services {
    pub queue: Arc<dyn JobQueue>,
    pub progress: Arc<dyn ProgressStore>,
    pub store: Arc<dyn MovieStore>,
    pub movies: Arc<dyn MovieSource>,
    pub lists: Arc<dyn ListSource>,
    pub ratings: Arc<dyn RatingsSource>,
    pub ceremonies: Arc<dyn CeremonySource>,
    pub universe: Arc<dyn IdUniverse>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<IngestConfig>,
}

impl Services {
    pub async fn enqueue(&self, args: &JobArgs) -> QueueResult<InsertResult> {
        self.queue.insert(args.to_new_job()).await
    }

    pub fn notify(&self, topic: &str, event: ImportEvent) {
        self.notifier.publish(topic, event);
    }
}
