//! Event routes
//!
//! - `GET /?topic=backfill` - SSE stream of import notifications, optionally
//!   limited to one topic

use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::notify::{BroadcastNotifier, Notification};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    pub topic: Option<String>,
}

pub fn events_routes() -> Router<BroadcastNotifier> {
    Router::new().route("/", get(event_stream))
}

fn to_event(notification: &Notification, topic: Option<&str>) -> Option<Event> {
    if topic.is_some_and(|t| t != notification.topic) {
        return None;
    }
    match serde_json::to_string(notification) {
        Ok(json) => Some(Event::default().event(notification.event.name()).data(json)),
        Err(e) => {
            warn!("Failed to serialize notification: {}", e);
            None
        },
    }
}

async fn event_stream(
    State(notifier): State<BroadcastNotifier>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(topic = ?query.topic, "New SSE client connected");

    let topic = query.topic;
    let stream = BroadcastStream::new(notifier.subscribe()).filter_map(move |result| {
        let topic = topic.clone();
        async move {
            match result {
                Ok(notification) => to_event(&notification, topic.as_deref()).map(Ok),
                Err(e) => {
                    // Lagged receivers skip ahead
                    warn!("SSE stream error: {:?}", e);
                    None
                },
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{topics, ImportEvent};
    use chrono::Utc;

    fn notification(topic: &str) -> Notification {
        Notification {
            topic: topic.to_string(),
            at: Utc::now(),
            event: ImportEvent::BackfillStatusChanged {
                status: "running".to_string(),
            },
        }
    }

    #[test]
    fn test_topic_filter() {
        let n = notification(topics::BACKFILL);
        assert!(to_event(&n, None).is_some());
        assert!(to_event(&n, Some(topics::BACKFILL)).is_some());
        assert!(to_event(&n, Some(topics::LIST_IMPORT)).is_none());
    }

    #[test]
    fn test_events_routes_build() {
        let _router = events_routes();
    }
}
