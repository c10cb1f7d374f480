//! Sync Reconciler: merges authoritative feed snapshots into per-session
//! views.
//!
//! The reconciler subscribes to the authoritative record feed and funnels
//! every matching snapshot through the view's reducer, delivering the
//! merged, ordered message list to the consumer. Dropping the subscription
//! releases the underlying feed receiver; listeners never leak across
//! session switches.

mod reducer;

pub use reducer::{SessionView, SyncEvent};

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use confab_types::event::FeedSnapshot;
use confab_types::message::ChatMessage;

/// Port trait for the authoritative record feed.
///
/// The feed pushes the full current record set for a session on every
/// committed change. Eventually consistent: consumers merge snapshots,
/// they never apply deltas.
pub trait RecordFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<FeedSnapshot>;
}

/// The Sync Reconciler.
pub struct Reconciler<F> {
    feed: Arc<F>,
}

impl<F> Clone for Reconciler<F> {
    fn clone(&self) -> Self {
        Self {
            feed: self.feed.clone(),
        }
    }
}

impl<F: RecordFeed + 'static> Reconciler<F> {
    pub fn new(feed: Arc<F>) -> Self {
        Self { feed }
    }

    /// Subscribe a session view to the authoritative feed.
    ///
    /// Every snapshot for the view's session is merged through the reducer
    /// and the resulting message list is delivered on the returned
    /// subscription. Dropping the subscription tears down the feed
    /// listener.
    pub fn subscribe(&self, view: Arc<Mutex<SessionView>>) -> SyncSubscription {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let mut feed_rx = self.feed.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    received = feed_rx.recv() => match received {
                        Ok(snapshot) => {
                            let mut view = view.lock().await;
                            if snapshot.session_id != view.session_id() {
                                continue;
                            }
                            let anomalies = view.apply(SyncEvent::Snapshot(snapshot));
                            for anomaly in anomalies {
                                warn!(error = %anomaly, "sync merge anomaly");
                            }
                            if tx.send(view.messages()).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // Snapshots carry full state, so a lag only
                            // means intermediate states were skipped.
                            debug!(skipped, "feed receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        SyncSubscription { cancel, changes: rx }
    }
}

/// Handle to an active feed subscription. Dropping it releases the
/// underlying listener.
pub struct SyncSubscription {
    cancel: CancellationToken,
    changes: mpsc::UnboundedReceiver<Vec<ChatMessage>>,
}

impl SyncSubscription {
    /// Next merged view, or `None` once the subscription has ended.
    pub async fn changed(&mut self) -> Option<Vec<ChatMessage>> {
        self.changes.recv().await
    }
}

impl Drop for SyncSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
