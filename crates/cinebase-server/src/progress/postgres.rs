//! Progress store over the `import_progress` table

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use super::{ProgressError, ProgressResult, ProgressStore};

#[derive(Clone)]
pub struct PgProgressStore {
    pool: PgPool,
}

impl PgProgressStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for PgProgressStore {
    async fn get(&self, key: &str) -> ProgressResult<Option<Value>> {
        let value = sqlx::query_scalar("SELECT value FROM import_progress WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: Value) -> ProgressResult<()> {
        sqlx::query(
            r#"
            INSERT INTO import_progress (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn increment(&self, key: &str, by: i64) -> ProgressResult<i64> {
        let next: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO import_progress (key, value, updated_at)
            VALUES ($1, to_jsonb($2::bigint), NOW())
            ON CONFLICT (key) DO UPDATE
                SET value = to_jsonb((import_progress.value #>> '{}')::bigint + $2::bigint),
                    updated_at = NOW()
                WHERE jsonb_typeof(import_progress.value) = 'number'
            RETURNING (value #>> '{}')::bigint
            "#,
        )
        .bind(key)
        .bind(by)
        .fetch_optional(&self.pool)
        .await?;

        next.ok_or_else(|| ProgressError::NotACounter(key.to_string()))
    }

    async fn compare_and_swap(&self, key: &str, expected: Option<&Value>, new: Value) -> ProgressResult<bool> {
        let result = match expected {
            None => {
                sqlx::query(
                    "INSERT INTO import_progress (key, value, updated_at) VALUES ($1, $2, NOW()) \
                     ON CONFLICT (key) DO NOTHING",
                )
                .bind(key)
                .bind(new)
                .execute(&self.pool)
                .await?
            },
            Some(expected) => {
                sqlx::query(
                    "UPDATE import_progress SET value = $3, updated_at = NOW() \
                     WHERE key = $1 AND value = $2",
                )
                .bind(key)
                .bind(expected)
                .bind(new)
                .execute(&self.pool)
                .await?
            },
        };
        Ok(result.rows_affected() == 1)
    }
}
