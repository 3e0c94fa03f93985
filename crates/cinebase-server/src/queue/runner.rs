//! Queue runner
//!
//! One polling task per configured queue. Each task claims as many jobs as
//! it has free concurrency slots, runs them on spawned tasks and records the
//! outcome. Failed attempts back off `15s + attempt^4` before the next try.
//! A separate task takes back jobs left `executing` by a node that died.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::types::{Job, RescueCounts};
use super::{JobQueue, QueueResult};

/// Successful result of running a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Done; the value is stored as the job's meta
    Complete(Value),
    /// Stop without retrying
    Cancel(String),
}

impl JobOutcome {
    pub fn complete() -> Self {
        JobOutcome::Complete(Value::Object(Default::default()))
    }
}

/// Failed attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    /// Try again after backoff, until attempts run out
    #[error("{0}")]
    Retryable(String),

    /// Discard immediately
    #[error("{0}")]
    Permanent(String),
}

impl JobError {
    pub fn retryable(msg: impl std::fmt::Display) -> Self {
        JobError::Retryable(msg.to_string())
    }

    pub fn permanent(msg: impl std::fmt::Display) -> Self {
        JobError::Permanent(msg.to_string())
    }
}

impl From<super::QueueError> for JobError {
    fn from(err: super::QueueError) -> Self {
        JobError::Retryable(err.to_string())
    }
}

pub type JobResult = Result<JobOutcome, JobError>;

/// Executes claimed jobs
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> JobResult;
}

/// Concurrency for one named queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueLimit {
    pub name: String,
    pub concurrency: usize,
}

impl QueueLimit {
    pub fn new(name: impl Into<String>, concurrency: usize) -> Self {
        Self {
            name: name.into(),
            concurrency: concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Identifies this process in `attempted_by`
    pub node: String,
    pub queues: Vec<QueueLimit>,
    pub poll_interval: Duration,
    /// Upper bound for a single attempt
    pub job_timeout: Duration,
    /// Age of an `executing` attempt after which it is presumed orphaned.
    /// Must exceed `job_timeout`.
    pub rescue_after: Duration,
}

impl RunnerConfig {
    pub fn default_node() -> String {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        format!("{}:{}", host, std::process::id())
    }
}

/// What happened to an executed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    Cancelled,
    Retried,
    Discarded,
}

/// Totals from [`QueueRunner::drain`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub completed: usize,
    pub cancelled: usize,
    pub retried: usize,
    pub discarded: usize,
}

impl DrainSummary {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Completed => self.completed += 1,
            Disposition::Cancelled => self.cancelled += 1,
            Disposition::Retried => self.retried += 1,
            Disposition::Discarded => self.discarded += 1,
        }
    }

    pub fn executed(&self) -> usize {
        self.completed + self.cancelled + self.retried + self.discarded
    }
}

/// Delay before the next attempt after `attempt` failed.
pub fn backoff(attempt: i32) -> Duration {
    let attempt = attempt.clamp(0, 20) as u64;
    Duration::from_secs(15 + attempt.pow(4))
}

pub struct QueueRunner {
    queue: Arc<dyn JobQueue>,
    executor: Arc<dyn JobExecutor>,
    config: RunnerConfig,
}

impl QueueRunner {
    pub fn new(queue: Arc<dyn JobQueue>, executor: Arc<dyn JobExecutor>, config: RunnerConfig) -> Self {
        Self {
            queue,
            executor,
            config,
        }
    }

    /// Start one polling task per queue. Tasks stop when `cancel` fires,
    /// after their in-flight jobs finish.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        info!(
            node = %self.config.node,
            queues = ?self.config.queues,
            "Starting queue runner"
        );
        let mut handles: Vec<JoinHandle<()>> = self
            .config
            .queues
            .clone()
            .into_iter()
            .map(|limit| {
                let runner = Arc::clone(&self);
                let cancel = cancel.clone();
                tokio::spawn(async move { runner.poll_queue(limit, cancel).await })
            })
            .collect();
        let runner = Arc::clone(&self);
        handles.push(tokio::spawn(async move { runner.rescue_loop(cancel).await }));
        handles
    }

    async fn rescue_loop(self: Arc<Self>, cancel: CancellationToken) {
        let period = (self.config.rescue_after / 2).max(self.config.poll_interval);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.rescue_stuck().await {
                        warn!(error = %e, "Failed to rescue stuck jobs");
                    }
                }
            }
        }
    }

    /// Return orphaned `executing` jobs to the queue.
    pub async fn rescue_stuck(&self) -> QueueResult<RescueCounts> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.rescue_after).unwrap_or_else(|_| chrono::Duration::days(1));
        let counts = self.queue.rescue_stuck(cutoff).await?;
        if counts.total() > 0 {
            warn!(
                retried = counts.retried,
                discarded = counts.discarded,
                "Rescued jobs orphaned in executing"
            );
        }
        Ok(counts)
    }

    async fn poll_queue(self: Arc<Self>, limit: QueueLimit, cancel: CancellationToken) {
        let slots = Arc::new(Semaphore::new(limit.concurrency));
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let free = slots.available_permits();
            if free == 0 {
                continue;
            }

            let jobs = match self
                .queue
                .fetch_available(&limit.name, free, Utc::now(), &self.config.node)
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    warn!(queue = %limit.name, error = %e, "Failed to fetch jobs");
                    continue;
                },
            };

            for job in jobs {
                let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                    break;
                };
                let runner = Arc::clone(&self);
                tokio::spawn(async move {
                    runner.execute(job).await;
                    drop(permit);
                });
            }
        }

        debug!(queue = %limit.name, "Waiting for in-flight jobs");
        let _ = slots.acquire_many(limit.concurrency as u32).await;
        info!(queue = %limit.name, "Queue stopped");
    }

    /// Run one claimed job and record its outcome.
    #[instrument(skip(self, job), fields(job_id = job.id, worker = %job.worker, attempt = job.attempt))]
    pub async fn execute(&self, job: Job) -> Disposition {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.job_timeout, self.executor.execute(&job)).await {
            Ok(result) => result,
            Err(_) => Err(JobError::Retryable(format!(
                "attempt timed out after {}s",
                self.config.job_timeout.as_secs()
            ))),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let (disposition, recorded) = match result {
            Ok(JobOutcome::Complete(meta)) => {
                debug!(elapsed_ms, "Job completed");
                (Disposition::Completed, self.queue.complete(job.id, meta).await)
            },
            Ok(JobOutcome::Cancel(reason)) => {
                info!(elapsed_ms, reason = %reason, "Job cancelled");
                (Disposition::Cancelled, self.queue.cancel(job.id, &reason).await)
            },
            Err(JobError::Retryable(msg)) if job.attempt < job.max_attempts => {
                let delay = backoff(job.attempt);
                warn!(elapsed_ms, error = %msg, retry_in_secs = delay.as_secs(), "Job failed, will retry");
                let retry_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                (Disposition::Retried, self.queue.retry(job.id, &msg, retry_at).await)
            },
            Err(err) => {
                error!(elapsed_ms, error = %err, max_attempts = job.max_attempts, "Job discarded");
                (Disposition::Discarded, self.queue.discard(job.id, &err.to_string()).await)
            },
        };

        if let Err(e) = recorded {
            error!(error = %e, "Failed to record job outcome");
        }
        disposition
    }

    /// Run jobs in the foreground until every queue is empty.
    ///
    /// With `with_scheduled`, future scheduled and retryable jobs run
    /// immediately. Stops after `max_rounds` fetch rounds so self-scheduling
    /// chains cannot spin forever.
    pub async fn drain(&self, with_scheduled: bool, max_rounds: usize) -> QueueResult<DrainSummary> {
        let mut summary = DrainSummary::default();
        self.rescue_stuck().await?;

        for _ in 0..max_rounds {
            let ready_at = if with_scheduled {
                Utc::now() + chrono::Duration::days(3650)
            } else {
                Utc::now()
            };

            let mut claimed = Vec::new();
            for limit in &self.config.queues {
                claimed.extend(
                    self.queue
                        .fetch_available(&limit.name, 1_000, ready_at, &self.config.node)
                        .await?,
                );
            }
            if claimed.is_empty() {
                break;
            }
            for job in claimed {
                summary.record(self.execute(job).await);
            }
        }

        Ok(summary)
    }
}
