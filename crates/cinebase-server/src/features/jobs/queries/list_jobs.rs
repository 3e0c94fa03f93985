//! List jobs query

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::Services;
use crate::queue::{Job, JobFilter, JobState, QueueError};

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 1000;

/// Query to list jobs, newest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListJobsQuery {
    /// Filter by worker (e.g. "fetch_movie")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    /// Filter by queue (e.g. "lists")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Comma-separated states, e.g. "available,retryable"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ListJobsError {
    #[error("Unknown job state '{0}'")]
    InvalidState(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl Request<Result<ListJobsResponse, ListJobsError>> for ListJobsQuery {}

impl ListJobsQuery {
    pub fn to_filter(&self) -> Result<JobFilter, ListJobsError> {
        let states = match &self.state {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<JobState>().map_err(|_| ListJobsError::InvalidState(s.to_string())))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(JobFilter {
            worker: self.worker.clone(),
            queue: self.queue.clone(),
            states,
            args_contains: None,
            limit: Some(self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)),
        })
    }
}

pub async fn handle(services: Services, query: ListJobsQuery) -> Result<ListJobsResponse, ListJobsError> {
    let filter = query.to_filter()?;
    let jobs = services.queue.list(&filter).await?;
    Ok(ListJobsResponse {
        count: jobs.len(),
        jobs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_defaults() {
        let filter = ListJobsQuery::default().to_filter().unwrap();
        assert!(filter.states.is_empty());
        assert_eq!(filter.limit, Some(DEFAULT_LIMIT));
    }

    #[test]
    fn test_filter_parses_states_and_clamps_limit() {
        let query = ListJobsQuery {
            worker: Some("fetch_movie".to_string()),
            state: Some("available, retryable".to_string()),
            limit: Some(50_000),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.states, vec![JobState::Available, JobState::Retryable]);
        assert_eq!(filter.limit, Some(MAX_LIMIT));
        assert_eq!(filter.worker.as_deref(), Some("fetch_movie"));
    }

    #[test]
    fn test_filter_rejects_unknown_state() {
        let query = ListJobsQuery {
            state: Some("running".to_string()),
            ..Default::default()
        };
        assert!(matches!(query.to_filter(), Err(ListJobsError::InvalidState(s)) if s == "running"));
    }
}
