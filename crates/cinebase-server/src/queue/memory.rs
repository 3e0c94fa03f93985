//! In-memory job queue

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use super::types::{AttemptError, InsertResult, Job, JobFilter, JobState, NewJob, RescueCounts, StateCounts};
use super::{JobQueue, QueueError, QueueResult};

#[derive(Default)]
struct Inner {
    next_id: i64,
    jobs: BTreeMap<i64, Job>,
}

impl Inner {
    fn insert(&mut self, new: NewJob, now: DateTime<Utc>) -> InsertResult {
        if let Some(unique) = &new.unique {
            if let Some(existing) = self
                .jobs
                .values()
                .find(|job| job.worker == new.worker && unique.matches(job, now))
            {
                return InsertResult {
                    job_id: existing.id,
                    conflict: true,
                };
            }
        }

        self.next_id += 1;
        let id = self.next_id;
        let state = new.initial_state(now);
        self.jobs.insert(
            id,
            Job {
                id,
                queue: new.queue,
                worker: new.worker,
                args: new.args,
                state,
                attempt: 0,
                max_attempts: new.max_attempts,
                priority: new.priority,
                unique_key: new.unique.map(|u| u.key),
                meta: Value::Object(Default::default()),
                errors: Vec::new(),
                attempted_by: None,
                scheduled_at: new.scheduled_at.unwrap_or(now),
                inserted_at: now,
                attempted_at: None,
                completed_at: None,
            },
        );
        InsertResult {
            job_id: id,
            conflict: false,
        }
    }

    fn executing(&mut self, id: i64) -> QueueResult<&mut Job> {
        let job = self.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.state != JobState::Executing {
            return Err(QueueError::InvalidState {
                id,
                state: job.state,
                expected: "executing",
            });
        }
        Ok(job)
    }
}

/// Job queue held in process memory
#[derive(Default)]
pub struct MemoryJobQueue {
    inner: Mutex<Inner>,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every job, oldest first. Intended for assertions in tests.
    pub async fn all_jobs(&self) -> Vec<Job> {
        self.inner.lock().await.jobs.values().cloned().collect()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn insert(&self, job: NewJob) -> QueueResult<InsertResult> {
        let mut inner = self.inner.lock().await;
        Ok(inner.insert(job, Utc::now()))
    }

    async fn insert_all(&self, jobs: Vec<NewJob>) -> QueueResult<Vec<InsertResult>> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        Ok(jobs.into_iter().map(|job| inner.insert(job, now)).collect())
    }

    async fn get(&self, id: i64) -> QueueResult<Option<Job>> {
        Ok(self.inner.lock().await.jobs.get(&id).cloned())
    }

    async fn list(&self, filter: &JobFilter) -> QueueResult<Vec<Job>> {
        let inner = self.inner.lock().await;
        let limit = filter.limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(inner
            .jobs
            .values()
            .rev()
            .filter(|job| filter.matches(job))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_by_state(&self, filter: &JobFilter) -> QueueResult<StateCounts> {
        let inner = self.inner.lock().await;
        let mut counts = StateCounts::default();
        for job in inner.jobs.values().filter(|job| filter.matches(job)) {
            counts.add(job.state, 1);
        }
        Ok(counts)
    }

    async fn fetch_available(
        &self,
        queue: &str,
        limit: usize,
        ready_at: DateTime<Utc>,
        node: &str,
    ) -> QueueResult<Vec<Job>> {
        let mut inner = self.inner.lock().await;

        let mut ready: Vec<(i32, DateTime<Utc>, i64)> = inner
            .jobs
            .values()
            .filter(|job| {
                job.queue == queue
                    && matches!(
                        job.state,
                        JobState::Available | JobState::Scheduled | JobState::Retryable
                    )
                    && job.scheduled_at <= ready_at
            })
            .map(|job| (job.priority, job.scheduled_at, job.id))
            .collect();
        ready.sort();
        ready.truncate(limit);

        let now = Utc::now();
        let mut claimed = Vec::with_capacity(ready.len());
        for (_, _, id) in ready {
            if let Some(job) = inner.jobs.get_mut(&id) {
                job.state = JobState::Executing;
                job.attempt += 1;
                job.attempted_at = Some(now);
                job.attempted_by = Some(node.to_string());
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: i64, meta: Value) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.executing(id)?;
        job.state = JobState::Completed;
        job.meta = meta;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn retry(&self, id: i64, error: &str, retry_at: DateTime<Utc>) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.executing(id)?;
        job.errors.push(AttemptError {
            attempt: job.attempt,
            at: Utc::now(),
            error: error.to_string(),
        });
        job.state = JobState::Retryable;
        job.scheduled_at = retry_at;
        Ok(())
    }

    async fn discard(&self, id: i64, error: &str) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.executing(id)?;
        let now = Utc::now();
        job.errors.push(AttemptError {
            attempt: job.attempt,
            at: now,
            error: error.to_string(),
        });
        job.state = JobState::Discarded;
        job.completed_at = Some(now);
        Ok(())
    }

    async fn cancel(&self, id: i64, reason: &str) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.state.is_terminal() {
            return Ok(());
        }
        let now = Utc::now();
        job.errors.push(AttemptError {
            attempt: job.attempt,
            at: now,
            error: reason.to_string(),
        });
        job.state = JobState::Cancelled;
        job.completed_at = Some(now);
        Ok(())
    }

    async fn rescue_stuck(&self, attempted_before: DateTime<Utc>) -> QueueResult<RescueCounts> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut counts = RescueCounts::default();
        let stuck = inner.jobs.values_mut().filter(|job| {
            job.state == JobState::Executing && job.attempted_at.is_some_and(|at| at < attempted_before)
        });
        for job in stuck {
            let error = rescue_reason(job);
            job.errors.push(AttemptError {
                attempt: job.attempt,
                at: now,
                error,
            });
            if job.attempt >= job.max_attempts {
                job.state = JobState::Discarded;
                job.completed_at = Some(now);
                counts.discarded += 1;
            } else {
                job.state = JobState::Retryable;
                job.scheduled_at = now;
                counts.retried += 1;
            }
        }
        Ok(counts)
    }
}

fn rescue_reason(job: &Job) -> String {
    format!(
        "rescued: attempt on {} never reported back",
        job.attempted_by.as_deref().unwrap_or("unknown node")
    )
}
