//! Pure state-transition function for a session's message view.
//!
//! The per-session message list is never mutated ad hoc: every change goes
//! through [`SessionView::apply`], which takes the current state and one
//! [`SyncEvent`] and produces the next state. This keeps the merge,
//! ordering, and de-duplication rules unit-testable without a live store.

use chrono::Duration;
use uuid::Uuid;

use confab_types::error::SyncError;
use confab_types::event::FeedSnapshot;
use confab_types::message::{ChatMessage, DeliveryStatus, Feedback};

/// Window within which a local optimistic record and an authoritative
/// record with a different id are considered the same logical message,
/// provided sender and content also match.
const MERGE_WINDOW_SECS: i64 = 2;

/// State-changing inputs to a session view.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A message was appended optimistically (status `sending`).
    LocalAppend(ChatMessage),
    /// The durable write for a local message succeeded.
    PersistAck { message_id: Uuid },
    /// The durable write for a local message failed.
    PersistFailed { message_id: Uuid },
    /// A batch of messages was marked read.
    MarkRead { message_ids: Vec<Uuid> },
    /// Feedback was recorded on a message.
    Feedback {
        message_id: Uuid,
        feedback: Option<Feedback>,
    },
    /// The authoritative feed pushed the full current record set.
    Snapshot(FeedSnapshot),
}

#[derive(Debug, Clone)]
struct ViewEntry {
    message: ChatMessage,
    /// Arrival sequence, used to break created-at ties.
    seq: u64,
}

/// The merged, ordered message view for one session.
#[derive(Debug)]
pub struct SessionView {
    session_id: Uuid,
    entries: Vec<ViewEntry>,
    next_seq: u64,
}

impl SessionView {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The current view, sorted ascending by created-at (arrival order
    /// breaks ties).
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn get(&self, message_id: Uuid) -> Option<&ChatMessage> {
        self.entries
            .iter()
            .find(|e| e.message.id == message_id)
            .map(|e| &e.message)
    }

    /// Apply one event, returning any merge anomalies encountered.
    ///
    /// Anomalies never block the view; conflicting merges are resolved by
    /// preferring the authoritative record.
    pub fn apply(&mut self, event: SyncEvent) -> Vec<SyncError> {
        let mut anomalies = Vec::new();
        match event {
            SyncEvent::LocalAppend(message) => {
                self.push(message);
            }
            SyncEvent::PersistAck { message_id } => {
                if let Some(entry) = self.entry_mut(message_id) {
                    // A retried write acks out of the error state.
                    if matches!(
                        entry.message.status,
                        DeliveryStatus::Sending | DeliveryStatus::Error
                    ) {
                        entry.message.status = DeliveryStatus::Sent;
                    }
                }
            }
            SyncEvent::PersistFailed { message_id } => {
                if let Some(entry) = self.entry_mut(message_id) {
                    if entry.message.status == DeliveryStatus::Sending {
                        entry.message.status = DeliveryStatus::Error;
                    }
                }
            }
            SyncEvent::MarkRead { message_ids } => {
                for id in message_ids {
                    if let Some(entry) = self.entry_mut(id) {
                        if entry.message.read_eligible() {
                            entry.message.status = DeliveryStatus::Read;
                        }
                    }
                }
            }
            SyncEvent::Feedback {
                message_id,
                feedback,
            } => {
                if let Some(entry) = self.entry_mut(message_id) {
                    entry.message.feedback = feedback;
                }
            }
            SyncEvent::Snapshot(snapshot) => {
                if snapshot.session_id == self.session_id {
                    anomalies = self.merge_snapshot(snapshot);
                }
            }
        }
        self.sort();
        anomalies
    }

    fn push(&mut self, message: ChatMessage) {
        self.entries.push(ViewEntry {
            message,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    fn entry_mut(&mut self, message_id: Uuid) -> Option<&mut ViewEntry> {
        self.entries.iter_mut().find(|e| e.message.id == message_id)
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| (a.message.created_at, a.seq).cmp(&(b.message.created_at, b.seq)));
    }

    /// Merge an authoritative snapshot into the view.
    ///
    /// Id match wins outright. For authoritative records with an unknown
    /// id, a single local optimistic record matching on (sender, content,
    /// time window) is discarded in favor of the authoritative one;
    /// multiple matches are a conflict, resolved by replacing the oldest
    /// candidate. Local records absent from the snapshot are retained
    /// (their durable write may still be in flight).
    fn merge_snapshot(&mut self, snapshot: FeedSnapshot) -> Vec<SyncError> {
        let mut anomalies = Vec::new();
        let snapshot_ids: Vec<Uuid> = snapshot.messages.iter().map(|m| m.id).collect();

        for authoritative in snapshot.messages {
            if let Some(entry) = self.entry_mut(authoritative.id) {
                // Local `read` is ahead of an authoritative `sent`; the
                // read batch may still be flushing.
                let keep_read = entry.message.status == DeliveryStatus::Read
                    && authoritative.status == DeliveryStatus::Sent;
                entry.message = authoritative;
                if keep_read {
                    entry.message.status = DeliveryStatus::Read;
                }
                continue;
            }

            let mut candidates: Vec<usize> = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| {
                    !snapshot_ids.contains(&e.message.id)
                        && e.message.sender == authoritative.sender
                        && e.message.content == authoritative.content
                        && (e.message.created_at - authoritative.created_at).abs()
                            <= Duration::seconds(MERGE_WINDOW_SECS)
                })
                .map(|(i, _)| i)
                .collect();

            match candidates.len() {
                0 => self.push(authoritative),
                1 => {
                    self.entries[candidates[0]].message = authoritative;
                }
                n => {
                    anomalies.push(SyncError::Conflict {
                        session_id: self.session_id,
                        authoritative_id: authoritative.id,
                        candidates: n,
                    });
                    candidates.sort_by_key(|&i| self.entries[i].message.created_at);
                    self.entries[candidates[0]].message = authoritative;
                }
            }
        }

        anomalies
    }
}
