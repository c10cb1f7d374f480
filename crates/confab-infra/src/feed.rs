//! Authoritative change feed.
//!
//! The repositories publish a [`FeedSnapshot`] -- the full current message
//! set for a session -- after every committed write. Consumers (the Sync
//! Reconciler) merge snapshots rather than applying deltas, so a lagged or
//! dropped snapshot is harmless: the next one carries complete state.

use tokio::sync::broadcast;

use confab_core::sync::RecordFeed;
use confab_types::event::FeedSnapshot;

/// Broadcast channel of per-session snapshots.
pub struct ChangeFeed {
    sender: broadcast::Sender<FeedSnapshot>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a snapshot to all subscribers. No-op without subscribers.
    pub fn publish(&self, snapshot: FeedSnapshot) {
        let _ = self.sender.send(snapshot);
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(64)
    }
}

impl RecordFeed for ChangeFeed {
    fn subscribe(&self) -> broadcast::Receiver<FeedSnapshot> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn snapshots_reach_subscribers() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();

        let session_id = Uuid::now_v7();
        feed.publish(FeedSnapshot {
            session_id,
            messages: Vec::new(),
        });

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.session_id, session_id);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let feed = ChangeFeed::new(8);
        feed.publish(FeedSnapshot {
            session_id: Uuid::now_v7(),
            messages: Vec::new(),
        });
    }
}
