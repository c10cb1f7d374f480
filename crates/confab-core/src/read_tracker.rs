//! Read-Tracker: debounced, batched read receipts.
//!
//! The viewport reports enter/exit visibility per message. A message only
//! counts as read once it has stayed continuously visible for the debounce
//! window, so fast scrolling never generates writes. Due messages are
//! flushed as one batch per flush, not one write per message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use confab_types::error::RepositoryError;
use confab_types::message::ChatMessage;

use crate::ledger::{MessageLedger, MessageRepository};

/// Tracks viewport visibility for one session's messages.
pub struct ReadTracker<R> {
    ledger: Arc<MessageLedger<R>>,
    session_id: Uuid,
    debounce: Duration,
    visible: Mutex<HashMap<Uuid, Instant>>,
}

impl<R: MessageRepository + 'static> ReadTracker<R> {
    pub fn new(ledger: Arc<MessageLedger<R>>, session_id: Uuid, debounce: Duration) -> Self {
        Self {
            ledger,
            session_id,
            debounce,
            visible: Mutex::new(HashMap::new()),
        }
    }

    /// The viewport started showing this message.
    ///
    /// Only assistant-authored, delivered-but-unread messages are tracked;
    /// everything else is ignored. Re-observing keeps the original entry
    /// time.
    pub fn observe(&self, message: &ChatMessage) {
        if !message.read_eligible() {
            return;
        }
        self.visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(message.id)
            .or_insert_with(Instant::now);
    }

    /// The viewport stopped showing this message before it counted as
    /// read.
    pub fn unobserve(&self, message_id: Uuid) {
        self.visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&message_id);
    }

    /// Flush messages that have been visible for the full debounce window
    /// as a single batch. Returns how many were marked read.
    ///
    /// On failure the batch is requeued with its original entry times and
    /// will be retried on the next flush.
    pub async fn flush_due(&self) -> Result<usize, RepositoryError> {
        let due: Vec<(Uuid, Instant)> = {
            let mut visible = self.visible.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let ids: Vec<Uuid> = visible
                .iter()
                .filter(|(_, since)| now.duration_since(**since) >= self.debounce)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| visible.remove(&id).map(|since| (id, since)))
                .collect()
        };

        if due.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = due.iter().map(|(id, _)| *id).collect();
        match self.ledger.mark_read(self.session_id, &ids).await {
            Ok(()) => Ok(ids.len()),
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "read batch flush failed");
                let mut visible = self.visible.lock().unwrap_or_else(PoisonError::into_inner);
                for (id, since) in due {
                    visible.entry(id).or_insert(since);
                }
                Err(err)
            }
        }
    }

    /// Periodically flush due batches until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.debounce);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let _ = self.flush_due().await;
                }
            }
        }
    }
}
