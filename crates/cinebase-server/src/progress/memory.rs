//! In-memory progress store

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{ProgressError, ProgressResult, ProgressStore};

#[derive(Default)]
pub struct MemoryProgressStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get(&self, key: &str) -> ProgressResult<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> ProgressResult<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn increment(&self, key: &str, by: i64) -> ProgressResult<i64> {
        let mut entries = self.entries.lock().await;
        let current = match entries.get(key) {
            None => 0,
            Some(value) => value.as_i64().ok_or_else(|| ProgressError::NotACounter(key.to_string()))?,
        };
        let next = current + by;
        entries.insert(key.to_string(), Value::from(next));
        Ok(next)
    }

    async fn compare_and_swap(&self, key: &str, expected: Option<&Value>, new: Value) -> ProgressResult<bool> {
        let mut entries = self.entries.lock().await;
        if entries.get(key) != expected {
            return Ok(false);
        }
        entries.insert(key.to_string(), new);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_increment_is_atomic_across_tasks() {
        let store = Arc::new(MemoryProgressStore::new());
        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.increment("n", 5).await.unwrap() })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.get("n").await.unwrap(), Some(json!(100)));
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let store = MemoryProgressStore::new();
        assert!(store.compare_and_swap("status", None, json!("QUEUED")).await.unwrap());
        assert!(!store.compare_and_swap("status", None, json!("QUEUED")).await.unwrap());
        assert!(store
            .compare_and_swap("status", Some(&json!("QUEUED")), json!("IN_PROGRESS"))
            .await
            .unwrap());
        assert_eq!(store.get("status").await.unwrap(), Some(json!("IN_PROGRESS")));
    }
}
