//! Import progress state
//!
//! A process-wide key/value store of JSON values. Entries are created on
//! first write, overwritten on later writes and never deleted. Counters go
//! through [`ProgressStore::increment`] and guarded transitions through
//! [`ProgressStore::compare_and_swap`], so concurrent workers never lose
//! updates.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryProgressStore;
pub use postgres::PgProgressStore;

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Progress database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Progress value for '{key}' has unexpected shape: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Progress value for '{0}' is not a counter")]
    NotACounter(String),
}

impl From<ProgressError> for crate::queue::runner::JobError {
    fn from(err: ProgressError) -> Self {
        crate::queue::runner::JobError::Retryable(err.to_string())
    }
}

pub type ProgressResult<T> = Result<T, ProgressError>;

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, key: &str) -> ProgressResult<Option<Value>>;

    async fn put(&self, key: &str, value: Value) -> ProgressResult<()>;

    /// Add `by` to an integer entry (missing counts as 0) and return the new value.
    async fn increment(&self, key: &str, by: i64) -> ProgressResult<i64>;

    /// Write `new` only if the current value equals `expected`
    /// (`None` meaning the key is absent). Returns whether it wrote.
    async fn compare_and_swap(&self, key: &str, expected: Option<&Value>, new: Value) -> ProgressResult<bool>;
}

/// Read and decode a typed entry.
pub async fn read<T: DeserializeOwned>(store: &dyn ProgressStore, key: &str) -> ProgressResult<Option<T>> {
    match store.get(key).await? {
        None => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| ProgressError::Decode {
                key: key.to_string(),
                source,
            }),
    }
}

/// Encode and write a typed entry.
pub async fn write<T: Serialize + Sync>(store: &dyn ProgressStore, key: &str, value: &T) -> ProgressResult<()> {
    let value = serde_json::to_value(value).map_err(|source| ProgressError::Decode {
        key: key.to_string(),
        source,
    })?;
    store.put(key, value).await
}

/// Read an integer counter, treating a missing entry as 0.
pub async fn counter(store: &dyn ProgressStore, key: &str) -> ProgressResult<i64> {
    match store.get(key).await? {
        None => Ok(0),
        Some(value) => value.as_i64().ok_or_else(|| ProgressError::NotACounter(key.to_string())),
    }
}

/// Well-known keys
pub mod keys {
    pub const BACKFILL_STATUS: &str = "backfill:status";
    pub const BACKFILL_SETTINGS: &str = "backfill:settings";
    pub const BACKFILL_CURRENT_BATCH: &str = "backfill:current_batch";
    pub const BACKFILL_TOTAL_QUEUED: &str = "backfill:total_queued";
    pub const BACKFILL_LAST_STEP_AT: &str = "backfill:last_step_at";

    /// Missing count from the most recent gap analysis
    pub const GAP_MISSING_COUNT: &str = "gap:missing_count";
    /// When the id universe baseline was last refreshed
    pub const UNIVERSE_BASELINE_AT: &str = "universe:baseline_updated_at";

    pub fn list_import(list_key: &str) -> String {
        format!("list_import:{}", list_key)
    }

    pub fn list_import_status(list_key: &str) -> String {
        format!("list_import:{}:status", list_key)
    }

    pub fn festival_import(festival: &str, year: i32) -> String {
        format!("festival_import:{}:{}", festival, year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Settings {
        batch_size: u32,
    }

    #[tokio::test]
    async fn test_typed_helpers() {
        let store = MemoryProgressStore::new();
        assert_eq!(read::<Settings>(&store, "s").await.unwrap(), None);

        write(&store, "s", &Settings { batch_size: 500 }).await.unwrap();
        assert_eq!(read::<Settings>(&store, "s").await.unwrap(), Some(Settings { batch_size: 500 }));

        store.put("bad", json!("text")).await.unwrap();
        assert!(matches!(
            read::<Settings>(&store, "bad").await,
            Err(ProgressError::Decode { .. })
        ));
        assert!(matches!(counter(&store, "bad").await, Err(ProgressError::NotACounter(_))));
        assert_eq!(counter(&store, "absent").await.unwrap(), 0);
    }

    #[test]
    fn test_keys() {
        assert_eq!(keys::list_import("criterion"), "list_import:criterion");
        assert_eq!(keys::list_import_status("criterion"), "list_import:criterion:status");
        assert_eq!(keys::festival_import("cannes", 2019), "festival_import:cannes:2019");
    }
}
