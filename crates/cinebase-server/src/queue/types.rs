//! Job queue data types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Ready to run now
    Available,
    /// Waiting for `scheduled_at`
    Scheduled,
    /// Claimed by a runner
    Executing,
    /// Failed an attempt, waiting for its backoff to elapse
    Retryable,
    Completed,
    /// Exhausted its attempts or failed permanently
    Discarded,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 7] = [
        JobState::Available,
        JobState::Scheduled,
        JobState::Executing,
        JobState::Retryable,
        JobState::Completed,
        JobState::Discarded,
        JobState::Cancelled,
    ];

    /// States of a job that has not finished yet.
    pub const PENDING: [JobState; 4] = [
        JobState::Available,
        JobState::Scheduled,
        JobState::Executing,
        JobState::Retryable,
    ];

    /// States in which a job has not been picked up yet.
    pub const WAITING: [JobState; 2] = [JobState::Available, JobState::Scheduled];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Available => "available",
            JobState::Scheduled => "scheduled",
            JobState::Executing => "executing",
            JobState::Retryable => "retryable",
            JobState::Completed => "completed",
            JobState::Discarded => "discarded",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Discarded | JobState::Cancelled)
    }

    /// Terminal, but not successfully.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobState::Discarded | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .iter()
            .find(|state| state.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid job state: {}", s))
    }
}

/// One recorded failed attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptError {
    pub attempt: i32,
    pub at: DateTime<Utc>,
    pub error: String,
}

/// A persisted job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub queue: String,
    pub worker: String,
    pub args: Value,
    pub state: JobState,
    pub attempt: i32,
    pub max_attempts: i32,
    pub priority: i32,
    pub unique_key: Option<String>,
    pub meta: Value,
    pub errors: Vec<AttemptError>,
    pub attempted_by: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub inserted_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(|e| e.error.as_str())
    }
}

/// Uniqueness constraint for an insert.
///
/// An insert conflicts when a job with the same worker and key exists in one
/// of `states` and, if `period` is set, was inserted within that period.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueOpts {
    pub key: String,
    pub period: Option<Duration>,
    pub states: Vec<JobState>,
}

impl UniqueOpts {
    /// Unique while the job has not finished.
    pub fn while_pending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            period: None,
            states: JobState::PENDING.to_vec(),
        }
    }

    /// Unique only while the job has not been picked up.
    pub fn while_waiting(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            period: None,
            states: JobState::WAITING.to_vec(),
        }
    }

    pub fn within(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    pub(crate) fn matches(&self, job: &Job, now: DateTime<Utc>) -> bool {
        job.unique_key.as_deref() == Some(self.key.as_str())
            && self.states.contains(&job.state)
            && self.period.map_or(true, |p| job.inserted_at >= now - p)
    }
}

/// A job to insert
#[derive(Debug, Clone)]
pub struct NewJob {
    pub queue: String,
    pub worker: String,
    pub args: Value,
    pub priority: i32,
    pub max_attempts: i32,
    /// Run at this time instead of immediately
    pub scheduled_at: Option<DateTime<Utc>>,
    pub unique: Option<UniqueOpts>,
}

pub const DEFAULT_MAX_ATTEMPTS: i32 = 20;

impl NewJob {
    pub fn new(queue: impl Into<String>, worker: impl Into<String>, args: Value) -> Self {
        Self {
            queue: queue.into(),
            worker: worker.into(),
            args,
            priority: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            scheduled_at: None,
            unique: None,
        }
    }

    pub fn schedule_in(mut self, delay: std::time::Duration) -> Self {
        let delay = Duration::from_std(delay).unwrap_or_else(|_| Duration::zero());
        self.scheduled_at = Some(Utc::now() + delay);
        self
    }

    pub fn schedule_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn unique(mut self, unique: UniqueOpts) -> Self {
        self.unique = Some(unique);
        self
    }

    /// Initial state implied by the schedule.
    pub(crate) fn initial_state(&self, now: DateTime<Utc>) -> JobState {
        match self.scheduled_at {
            Some(at) if at > now => JobState::Scheduled,
            _ => JobState::Available,
        }
    }
}

/// Outcome of an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InsertResult {
    pub job_id: i64,
    /// True when a matching unique job already existed and nothing was inserted
    pub conflict: bool,
}

/// Filter for listing and counting jobs
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub worker: Option<String>,
    pub queue: Option<String>,
    /// Empty means any state
    pub states: Vec<JobState>,
    /// JSON containment on `args` (`args @> value`)
    pub args_contains: Option<Value>,
    pub limit: Option<i64>,
}

impl JobFilter {
    pub fn worker(worker: impl Into<String>) -> Self {
        Self {
            worker: Some(worker.into()),
            ..Default::default()
        }
    }

    pub fn states(mut self, states: &[JobState]) -> Self {
        self.states = states.to_vec();
        self
    }

    pub fn args_contains(mut self, value: Value) -> Self {
        self.args_contains = Some(value);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn matches(&self, job: &Job) -> bool {
        self.worker.as_deref().map_or(true, |w| job.worker == w)
            && self.queue.as_deref().map_or(true, |q| job.queue == q)
            && (self.states.is_empty() || self.states.contains(&job.state))
            && self.args_contains.as_ref().map_or(true, |v| json_contains(&job.args, v))
    }
}

/// Jobs taken back from a node that stopped reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RescueCounts {
    /// Returned to `retryable`, due immediately
    pub retried: u64,
    /// Out of attempts
    pub discarded: u64,
}

impl RescueCounts {
    pub fn total(&self) -> u64 {
        self.retried + self.discarded
    }
}

/// Job counts keyed by state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub available: i64,
    pub scheduled: i64,
    pub executing: i64,
    pub retryable: i64,
    pub completed: i64,
    pub discarded: i64,
    pub cancelled: i64,
}

impl StateCounts {
    pub fn add(&mut self, state: JobState, n: i64) {
        let slot = match state {
            JobState::Available => &mut self.available,
            JobState::Scheduled => &mut self.scheduled,
            JobState::Executing => &mut self.executing,
            JobState::Retryable => &mut self.retryable,
            JobState::Completed => &mut self.completed,
            JobState::Discarded => &mut self.discarded,
            JobState::Cancelled => &mut self.cancelled,
        };
        *slot += n;
    }

    pub fn total(&self) -> i64 {
        self.pending() + self.completed + self.failed()
    }

    pub fn pending(&self) -> i64 {
        self.available + self.scheduled + self.executing + self.retryable
    }

    pub fn failed(&self) -> i64 {
        self.discarded + self.cancelled
    }
}

/// Postgres-style `@>` containment for JSON values.
///
/// Objects contain objects whose keys are all present with contained values;
/// arrays contain arrays whose every element is contained in some element;
/// scalars must be equal.
pub fn json_contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Object(h), Value::Object(n)) => n
            .iter()
            .all(|(k, nv)| h.get(k).is_some_and(|hv| json_contains(hv, nv))),
        (Value::Array(h), Value::Array(n)) => {
            n.iter().all(|nv| h.iter().any(|hv| json_contains(hv, nv)))
        },
        (h, n) => h == n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_state_roundtrip_and_terminal() {
        for state in JobState::ALL {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Cancelled.is_failure());
        assert!(!JobState::Retryable.is_terminal());
        assert!("running".parse::<JobState>().is_err());
    }

    #[test]
    fn test_json_contains() {
        let args = json!({"import_id": 7, "list_key": "criterion", "page": 2, "tags": ["a", "b"]});
        assert!(json_contains(&args, &json!({"import_id": 7})));
        assert!(json_contains(&args, &json!({"tags": ["b"]})));
        assert!(!json_contains(&args, &json!({"import_id": 8})));
        assert!(!json_contains(&args, &json!({"missing": 1})));
        assert!(json_contains(&args, &json!({})));
    }

    #[test]
    fn test_state_counts() {
        let mut counts = StateCounts::default();
        counts.add(JobState::Completed, 3);
        counts.add(JobState::Executing, 1);
        counts.add(JobState::Discarded, 1);
        assert_eq!(counts.total(), 5);
        assert_eq!(counts.pending(), 1);
        assert_eq!(counts.failed(), 1);
    }

    #[test]
    fn test_new_job_initial_state() {
        let now = Utc::now();
        let job = NewJob::new("default", "noop", json!({}));
        assert_eq!(job.initial_state(now), JobState::Available);
        let later = job.schedule_at(now + Duration::seconds(30));
        assert_eq!(later.initial_state(now), JobState::Scheduled);
    }
}
