//! Change feed for response writes. Stores publish a discrete event after
//! every successful upsert; the live heat-map endpoint subscribes and
//! recomputes the aggregation on each tick. This keeps the store layer from
//! ever reaching into presentation state directly.

use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEvent {
    Added { event_id: String, name: String },
    Updated { event_id: String, name: String },
}

impl ResponseEvent {
    pub fn event_id(&self) -> &str {
        match self {
            ResponseEvent::Added { event_id, .. } => event_id,
            ResponseEvent::Updated { event_id, .. } => event_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseFeed {
    tx: broadcast::Sender<ResponseEvent>,
}

impl ResponseFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a change. Having no subscribers is not an error.
    pub fn publish(&self, event: ResponseEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::trace!("No live subscribers for response event: {:?}", e.0);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResponseEvent> {
        self.tx.subscribe()
    }
}

impl Default for ResponseFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let feed = ResponseFeed::default();
        let mut rx = feed.subscribe();
        let event = ResponseEvent::Added {
            event_id: "evt".into(),
            name: "alice".into(),
        };
        feed.publish(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
        assert_eq!(event.event_id(), "evt");
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let feed = ResponseFeed::default();
        feed.publish(ResponseEvent::Updated {
            event_id: "evt".into(),
            name: "bob".into(),
        });
    }
}
