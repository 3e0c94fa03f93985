//! Postgres-backed job queue
//!
//! Jobs live in the `jobs` table. Claiming uses `FOR UPDATE SKIP LOCKED` so
//! several nodes can poll the same queue, and unique inserts take a
//! transaction-scoped advisory lock on the `(worker, key)` pair.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::debug;

use super::types::{InsertResult, Job, JobFilter, JobState, NewJob, RescueCounts, StateCounts};
use super::{JobQueue, QueueError, QueueResult};

const JOB_COLUMNS: &str = "id, queue, worker, args, state, attempt, max_attempts, priority, \
     unique_key, meta, errors, attempted_by, scheduled_at, inserted_at, attempted_at, completed_at";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    queue: String,
    worker: String,
    args: Value,
    state: String,
    attempt: i32,
    max_attempts: i32,
    priority: i32,
    unique_key: Option<String>,
    meta: Value,
    errors: Value,
    attempted_by: Option<String>,
    scheduled_at: DateTime<Utc>,
    inserted_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state = row
            .state
            .parse::<JobState>()
            .map_err(|e| QueueError::Corrupt(format!("job {}: {}", row.id, e)))?;
        let errors = serde_json::from_value(row.errors)
            .map_err(|e| QueueError::Corrupt(format!("job {} errors: {}", row.id, e)))?;

        Ok(Job {
            id: row.id,
            queue: row.queue,
            worker: row.worker,
            args: row.args,
            state,
            attempt: row.attempt,
            max_attempts: row.max_attempts,
            priority: row.priority,
            unique_key: row.unique_key,
            meta: row.meta,
            errors,
            attempted_by: row.attempted_by,
            scheduled_at: row.scheduled_at,
            inserted_at: row.inserted_at,
            attempted_at: row.attempted_at,
            completed_at: row.completed_at,
        })
    }
}

/// Job queue over a Postgres pool
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        job: NewJob,
    ) -> QueueResult<InsertResult> {
        let now = Utc::now();

        if let Some(unique) = &job.unique {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2))")
                .bind(&job.worker)
                .bind(&unique.key)
                .execute(&mut **tx)
                .await?;

            let states: Vec<String> = unique.states.iter().map(|s| s.as_str().to_string()).collect();
            let since = unique.period.map(|p| now - p);
            let existing: Option<i64> = sqlx::query_scalar(
                r#"
                SELECT id FROM jobs
                WHERE worker = $1
                  AND unique_key = $2
                  AND state = ANY($3)
                  AND ($4::timestamptz IS NULL OR inserted_at >= $4)
                ORDER BY id DESC
                LIMIT 1
                "#,
            )
            .bind(&job.worker)
            .bind(&unique.key)
            .bind(&states)
            .bind(since)
            .fetch_optional(&mut **tx)
            .await?;

            if let Some(job_id) = existing {
                debug!(worker = %job.worker, key = %unique.key, job_id, "Unique job already exists");
                return Ok(InsertResult {
                    job_id,
                    conflict: true,
                });
            }
        }

        let state = job.initial_state(now);
        let job_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (queue, worker, args, state, max_attempts, priority, unique_key, scheduled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&job.queue)
        .bind(&job.worker)
        .bind(&job.args)
        .bind(state.as_str())
        .bind(job.max_attempts)
        .bind(job.priority)
        .bind(job.unique.as_ref().map(|u| u.key.as_str()))
        .bind(job.scheduled_at.unwrap_or(now))
        .fetch_one(&mut **tx)
        .await?;

        Ok(InsertResult {
            job_id,
            conflict: false,
        })
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &JobFilter) {
        builder.push(" WHERE TRUE");
        if let Some(worker) = &filter.worker {
            builder.push(" AND worker = ").push_bind(worker.clone());
        }
        if let Some(queue) = &filter.queue {
            builder.push(" AND queue = ").push_bind(queue.clone());
        }
        if !filter.states.is_empty() {
            let states: Vec<String> = filter.states.iter().map(|s| s.as_str().to_string()).collect();
            builder.push(" AND state = ANY(").push_bind(states).push(")");
        }
        if let Some(args) = &filter.args_contains {
            builder.push(" AND args @> ").push_bind(args.clone());
        }
    }

    /// Apply a state transition to an executing job, failing if it is not executing.
    async fn transition(&self, id: i64, result: sqlx::postgres::PgQueryResult) -> QueueResult<()> {
        if result.rows_affected() > 0 {
            return Ok(());
        }
        match self.get(id).await? {
            None => Err(QueueError::NotFound(id)),
            Some(job) => Err(QueueError::InvalidState {
                id,
                state: job.state,
                expected: "executing",
            }),
        }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn insert(&self, job: NewJob) -> QueueResult<InsertResult> {
        let mut tx = self.pool.begin().await?;
        let result = Self::insert_in_tx(&mut tx, job).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn insert_all(&self, jobs: Vec<NewJob>) -> QueueResult<Vec<InsertResult>> {
        let mut tx = self.pool.begin().await?;
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            results.push(Self::insert_in_tx(&mut tx, job).await?);
        }
        tx.commit().await?;
        Ok(results)
    }

    async fn get(&self, id: i64) -> QueueResult<Option<Job>> {
        let sql = format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS);
        let row: Option<JobRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(Job::try_from).transpose()
    }

    async fn list(&self, filter: &JobFilter) -> QueueResult<Vec<Job>> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM jobs", JOB_COLUMNS));
        Self::push_filter(&mut builder, filter);
        builder.push(" ORDER BY id DESC");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows: Vec<JobRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    async fn count_by_state(&self, filter: &JobFilter) -> QueueResult<StateCounts> {
        let mut builder = QueryBuilder::new("SELECT state, COUNT(*) FROM jobs");
        Self::push_filter(&mut builder, filter);
        builder.push(" GROUP BY state");

        let rows: Vec<(String, i64)> = builder.build_query_as().fetch_all(&self.pool).await?;
        let mut counts = StateCounts::default();
        for (state, n) in rows {
            let state = state.parse::<JobState>().map_err(QueueError::Corrupt)?;
            counts.add(state, n);
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
        if limit == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            UPDATE jobs
            SET state = 'executing',
                attempt = attempt + 1,
                attempted_at = NOW(),
                attempted_by = $4
            WHERE id IN (
                SELECT id FROM jobs
                WHERE queue = $1
                  AND state IN ('available', 'scheduled', 'retryable')
                  AND scheduled_at <= $3
                ORDER BY priority, scheduled_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let rows: Vec<JobRow> = sqlx::query_as(&sql)
            .bind(queue)
            .bind(limit as i64)
            .bind(ready_at)
            .bind(node)
            .fetch_all(&self.pool)
            .await?;

        let mut jobs: Vec<Job> = rows.into_iter().map(Job::try_from).collect::<QueueResult<_>>()?;
        jobs.sort_by_key(|job| (job.priority, job.scheduled_at, job.id));
        Ok(jobs)
    }

    async fn complete(&self, id: i64, meta: Value) -> QueueResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'completed', meta = $2, completed_at = NOW() \
             WHERE id = $1 AND state = 'executing'",
        )
        .bind(id)
        .bind(meta)
        .execute(&self.pool)
        .await?;
        self.transition(id, result).await
    }

    async fn retry(&self, id: i64, error: &str, retry_at: DateTime<Utc>) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'retryable',
                scheduled_at = $3,
                errors = errors || jsonb_build_array(
                    jsonb_build_object('attempt', attempt, 'at', NOW(), 'error', $2::text))
            WHERE id = $1 AND state = 'executing'
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await?;
        self.transition(id, result).await
    }

    async fn discard(&self, id: i64, error: &str) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'discarded',
                discarded_at = NOW(),
                completed_at = NOW(),
                errors = errors || jsonb_build_array(
                    jsonb_build_object('attempt', attempt, 'at', NOW(), 'error', $2::text))
            WHERE id = $1 AND state = 'executing'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        self.transition(id, result).await
    }

    async fn cancel(&self, id: i64, reason: &str) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'cancelled',
                cancelled_at = NOW(),
                completed_at = NOW(),
                errors = errors || jsonb_build_array(
                    jsonb_build_object('attempt', attempt, 'at', NOW(), 'error', $2::text))
            WHERE id = $1 AND state NOT IN ('completed', 'discarded', 'cancelled')
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && self.get(id).await?.is_none() {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn rescue_stuck(&self, attempted_before: DateTime<Utc>) -> QueueResult<RescueCounts> {
        let states: Vec<String> = sqlx::query_scalar(
            r#"
            WITH stuck AS (
                SELECT id FROM jobs
                WHERE state = 'executing' AND attempted_at < $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs j
            SET state = CASE WHEN j.attempt >= j.max_attempts THEN 'discarded' ELSE 'retryable' END,
                scheduled_at = CASE WHEN j.attempt >= j.max_attempts THEN j.scheduled_at ELSE NOW() END,
                discarded_at = CASE WHEN j.attempt >= j.max_attempts THEN NOW() ELSE j.discarded_at END,
                completed_at = CASE WHEN j.attempt >= j.max_attempts THEN NOW() ELSE j.completed_at END,
                errors = j.errors || jsonb_build_array(jsonb_build_object(
                    'attempt', j.attempt,
                    'at', NOW(),
                    'error', 'rescued: attempt on ' || COALESCE(j.attempted_by, 'unknown node')
                             || ' never reported back'))
            FROM stuck
            WHERE j.id = stuck.id
            RETURNING j.state
            "#,
        )
        .bind(attempted_before)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = RescueCounts::default();
        for state in states {
            if state == JobState::Discarded.as_str() {
                counts.discarded += 1;
            } else {
                counts.retried += 1;
            }
        }
        Ok(counts)
    }
}
