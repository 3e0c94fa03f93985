//! Import progress notifications
//!
//! Fire-and-forget events for progress display. Nothing in the import
//! pipeline reads them back; coordination goes through the queue and the
//! progress store only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

pub mod topics {
    pub const LIST_IMPORT: &str = "list_import";
    pub const BACKFILL: &str = "backfill";
    pub const FESTIVAL_IMPORT: &str = "festival_import";
    pub const MOVIES: &str = "movies";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ImportEvent {
    ListImportStarted {
        list_key: String,
        import_id: i64,
        total_pages: u32,
    },
    ListPageProcessed {
        list_key: String,
        import_id: i64,
        page: u32,
        updated: u32,
        queued: u32,
        skipped: u32,
    },
    ListImportCompleted {
        list_key: String,
        import_id: i64,
        total_movies: i64,
    },
    ListImportFailed {
        list_key: String,
        import_id: i64,
        reason: String,
    },
    BackfillStatusChanged {
        status: String,
    },
    BackfillBatchQueued {
        batch: i64,
        queued: usize,
    },
    MovieImported {
        tmdb_id: i64,
        movie_id: i64,
        import_status: String,
    },
    FestivalImported {
        festival: String,
        year: i32,
        nominations: usize,
        unresolved: usize,
    },
    FestivalImportFailed {
        festival: String,
        year: i32,
        reason: String,
    },
}

impl ImportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ImportEvent::ListImportStarted { .. } => "list_import.started",
            ImportEvent::ListPageProcessed { .. } => "list_import.page_processed",
            ImportEvent::ListImportCompleted { .. } => "list_import.completed",
            ImportEvent::ListImportFailed { .. } => "list_import.failed",
            ImportEvent::BackfillStatusChanged { .. } => "backfill.status_changed",
            ImportEvent::BackfillBatchQueued { .. } => "backfill.batch_queued",
            ImportEvent::MovieImported { .. } => "movies.imported",
            ImportEvent::FestivalImported { .. } => "festival_import.completed",
            ImportEvent::FestivalImportFailed { .. } => "festival_import.failed",
        }
    }
}

/// A published event with its topic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub topic: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ImportEvent,
}

pub trait Notifier: Send + Sync {
    /// Publish without waiting; delivery is not guaranteed.
    fn publish(&self, topic: &str, event: ImportEvent);
}

/// In-process pub/sub over a tokio broadcast channel
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, topic: &str, event: ImportEvent) {
        trace!(topic, event = event.name(), "Publishing notification");
        // No subscribers is fine
        let _ = self.tx.send(Notification {
            topic: topic.to_string(),
            at: Utc::now(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.publish(
            topics::BACKFILL,
            ImportEvent::BackfillStatusChanged {
                status: "running".into(),
            },
        );

        let received = rx.recv().await.unwrap();
        assert_eq!(received.topic, "backfill");
        assert_eq!(received.event.name(), "backfill.status_changed");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = BroadcastNotifier::default();
        notifier.publish(
            topics::MOVIES,
            ImportEvent::MovieImported {
                tmdb_id: 1,
                movie_id: 1,
                import_status: "full".into(),
            },
        );
    }

    #[test]
    fn test_notification_serializes_flat() {
        let notification = Notification {
            topic: topics::LIST_IMPORT.into(),
            at: Utc::now(),
            event: ImportEvent::ListImportFailed {
                list_key: "criterion".into(),
                import_id: 7,
                reason: "completion_check_exhausted".into(),
            },
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["event"], "list_import_failed");
        assert_eq!(json["reason"], "completion_check_exhausted");
    }
}
