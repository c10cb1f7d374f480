//! Message Ledger: append-only, time-ordered message log per session.
//!
//! `append` makes the message locally visible with status `sending` before
//! the durable write starts; the same view entry is updated in place when
//! persistence resolves, so the surface never flickers or shows a
//! duplicate. Failed writes leave the message visible in the `error` state
//! with an explicit retry path.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use confab_types::error::RepositoryError;
use confab_types::event::{EngineEvent, FeedSnapshot};
use confab_types::message::{ChatMessage, DeliveryStatus, Feedback, Sender};

use crate::event::EventBus;
use crate::sync::{SessionView, SyncEvent};

/// One page of messages in chronological order.
#[derive(Debug, Clone)]
pub struct Page {
    pub messages: Vec<ChatMessage>,
    /// Whether older messages exist before the first entry of this page.
    pub has_more: bool,
}

/// Pagination cursor pointing at the oldest message of a previously
/// fetched page.
///
/// Rows sharing the boundary timestamp are ordered by id, so the cursor
/// carries both and the next page resumes exactly after the last row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl From<&ChatMessage> for PageCursor {
    fn from(message: &ChatMessage) -> Self {
        Self {
            created_at: message.created_at,
            id: message.id,
        }
    }
}

/// Port trait for message persistence.
///
/// `page` returns the most recent `limit` messages strictly older than
/// `cursor` (newest `limit` when the cursor is absent), in chronological
/// order, and reports whether more exist beyond the page.
pub trait MessageRepository: Send + Sync {
    fn insert(
        &self,
        message: &ChatMessage,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn page(
        &self,
        session_id: Uuid,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> impl Future<Output = Result<Page, RepositoryError>> + Send;

    fn mark_read(
        &self,
        session_id: Uuid,
        message_ids: &[Uuid],
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn set_feedback(
        &self,
        message_id: Uuid,
        feedback: Option<Feedback>,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// The Message Ledger service.
pub struct MessageLedger<R> {
    repo: Arc<R>,
    views: DashMap<Uuid, Arc<Mutex<SessionView>>>,
    hydrated: DashMap<Uuid, ()>,
    events: EventBus,
    page_size: u32,
}

impl<R: MessageRepository + 'static> MessageLedger<R> {
    pub fn new(repo: Arc<R>, events: EventBus, page_size: u32) -> Self {
        Self {
            repo,
            views: DashMap::new(),
            hydrated: DashMap::new(),
            events,
            page_size,
        }
    }

    /// The shared view for a session, created on first access.
    pub fn view(&self, session_id: Uuid) -> Arc<Mutex<SessionView>> {
        self.views
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(SessionView::new(session_id))))
            .clone()
    }

    /// Drop the in-memory view for a session (after deletion).
    pub fn forget(&self, session_id: Uuid) {
        self.views.remove(&session_id);
        self.hydrated.remove(&session_id);
    }

    /// Seed the in-memory view with the session's persisted history.
    ///
    /// Pages back to the first stored message and merges the result into
    /// the view, so a resumed session starts from its durable state
    /// instead of an empty view. Runs once per session; later calls are
    /// no-ops.
    pub async fn hydrate(&self, session_id: Uuid) -> Result<(), RepositoryError> {
        if self.hydrated.contains_key(&session_id) {
            return Ok(());
        }

        let mut history: Vec<ChatMessage> = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.repo.page(session_id, cursor, self.page_size).await?;
            if page.messages.is_empty() {
                break;
            }
            cursor = page.messages.first().map(PageCursor::from);
            let has_more = page.has_more;
            let mut older = page.messages;
            older.append(&mut history);
            history = older;
            if !has_more {
                break;
            }
        }

        if !history.is_empty() {
            self.view(session_id)
                .lock()
                .await
                .apply(SyncEvent::Snapshot(FeedSnapshot {
                    session_id,
                    messages: history,
                }));
        }
        self.hydrated.insert(session_id, ());
        Ok(())
    }

    /// The current merged view for a session, chronological.
    pub async fn messages(&self, session_id: Uuid) -> Vec<ChatMessage> {
        self.view(session_id).lock().await.messages()
    }

    /// Append a message optimistically and persist it in the background.
    ///
    /// The returned message is immediately visible with status `sending`;
    /// the view entry transitions to `sent` or `error` when the durable
    /// write resolves. Only `sent` is ever written to the store.
    pub async fn append(&self, session_id: Uuid, sender: Sender, content: String) -> ChatMessage {
        self.append_message(ChatMessage::new_sending(session_id, sender, content))
            .await
    }

    /// Append a prepared message (used for assistant replies carrying
    /// metadata).
    pub async fn append_message(&self, message: ChatMessage) -> ChatMessage {
        let session_id = message.session_id;
        let view = self.view(session_id);
        view.lock()
            .await
            .apply(SyncEvent::LocalAppend(message.clone()));
        self.events.publish(EngineEvent::MessageAppended {
            session_id,
            message_id: message.id,
        });

        let repo = self.repo.clone();
        let persisted = message.clone();
        tokio::spawn(async move {
            let mut durable = persisted.clone();
            durable.status = DeliveryStatus::Sent;
            let event = match repo.insert(&durable).await {
                Ok(()) => SyncEvent::PersistAck {
                    message_id: persisted.id,
                },
                Err(err) => {
                    warn!(message_id = %persisted.id, error = %err, "message persist failed");
                    SyncEvent::PersistFailed {
                        message_id: persisted.id,
                    }
                }
            };
            view.lock().await.apply(event);
        });

        message
    }

    /// Retry the durable write for a message in the `error` state.
    ///
    /// Explicit by contract: failed sends are never resent automatically.
    pub async fn retry(&self, session_id: Uuid, message_id: Uuid) -> Result<(), RepositoryError> {
        let view = self.view(session_id);
        let message = {
            let view = view.lock().await;
            match view.get(message_id) {
                Some(m) if m.status == DeliveryStatus::Error => m.clone(),
                Some(_) => return Ok(()),
                None => return Err(RepositoryError::NotFound),
            }
        };

        let mut durable = message;
        durable.status = DeliveryStatus::Sent;
        match self.repo.insert(&durable).await {
            Ok(()) => {
                view.lock().await.apply(SyncEvent::PersistAck { message_id });
                Ok(())
            }
            Err(err) => {
                warn!(message_id = %message_id, error = %err, "message retry failed");
                Err(err)
            }
        }
    }

    /// Fetch one page of history older than `cursor`.
    pub async fn page(
        &self,
        session_id: Uuid,
        cursor: Option<PageCursor>,
    ) -> Result<Page, RepositoryError> {
        self.repo.page(session_id, cursor, self.page_size).await
    }

    /// Mark a batch of messages read, durably and in the view.
    pub async fn mark_read(
        &self,
        session_id: Uuid,
        message_ids: &[Uuid],
    ) -> Result<(), RepositoryError> {
        if message_ids.is_empty() {
            return Ok(());
        }
        self.repo.mark_read(session_id, message_ids).await?;
        self.view(session_id).lock().await.apply(SyncEvent::MarkRead {
            message_ids: message_ids.to_vec(),
        });
        self.events.publish(EngineEvent::MarkedRead {
            session_id,
            count: message_ids.len(),
        });
        Ok(())
    }

    /// Record feedback on a message, durably and in the view.
    pub async fn set_feedback(
        &self,
        session_id: Uuid,
        message_id: Uuid,
        feedback: Option<Feedback>,
    ) -> Result<(), RepositoryError> {
        self.repo.set_feedback(message_id, feedback).await?;
        self.view(session_id).lock().await.apply(SyncEvent::Feedback {
            message_id,
            feedback,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct InMemoryMessages {
        messages: StdMutex<Vec<ChatMessage>>,
        fail_insert: AtomicBool,
    }

    impl MessageRepository for InMemoryMessages {
        async fn insert(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(RepositoryError::Connection);
            }
            self.messages.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn page(
            &self,
            session_id: Uuid,
            cursor: Option<PageCursor>,
            limit: u32,
        ) -> Result<Page, RepositoryError> {
            let mut matching: Vec<ChatMessage> = self
                .messages
                .lock()
                .unwrap()
                .iter()
                .filter(|m| m.session_id == session_id)
                .filter(|m| cursor.is_none_or(|c| (m.created_at, m.id) < (c.created_at, c.id)))
                .cloned()
                .collect();
            matching.sort_by_key(|m| (m.created_at, m.id));
            let has_more = matching.len() > limit as usize;
            let start = matching.len().saturating_sub(limit as usize);
            Ok(Page {
                messages: matching.split_off(start),
                has_more,
            })
        }

        async fn mark_read(
            &self,
            session_id: Uuid,
            message_ids: &[Uuid],
        ) -> Result<(), RepositoryError> {
            let mut messages = self.messages.lock().unwrap();
            for m in messages.iter_mut() {
                if m.session_id == session_id && message_ids.contains(&m.id) {
                    m.status = DeliveryStatus::Read;
                }
            }
            Ok(())
        }

        async fn set_feedback(
            &self,
            message_id: Uuid,
            feedback: Option<Feedback>,
        ) -> Result<(), RepositoryError> {
            let mut messages = self.messages.lock().unwrap();
            for m in messages.iter_mut() {
                if m.id == message_id {
                    m.feedback = feedback;
                }
            }
            Ok(())
        }
    }

    fn ledger(repo: Arc<InMemoryMessages>) -> (MessageLedger<InMemoryMessages>, EventBus) {
        let events = EventBus::new(16);
        (MessageLedger::new(repo, events.clone(), 30), events)
    }

    async fn wait_for_status(
        ledger: &MessageLedger<InMemoryMessages>,
        session_id: Uuid,
        message_id: Uuid,
        status: DeliveryStatus,
    ) {
        tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let view = ledger.view(session_id);
                if view.lock().await.get(message_id).map(|m| m.status) == Some(status) {
                    return;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("message never reached {status}"));
    }

    #[tokio::test]
    async fn append_is_visible_before_persistence_resolves() {
        let repo = Arc::new(InMemoryMessages::default());
        let (ledger, events) = ledger(repo.clone());
        let mut rx = events.subscribe();
        let session_id = Uuid::now_v7();

        let message = ledger
            .append(session_id, Sender::User, "hello".to_string())
            .await;
        assert_eq!(message.status, DeliveryStatus::Sending);
        assert_eq!(ledger.messages(session_id).await.len(), 1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::MessageAppended { .. }
        ));

        wait_for_status(&ledger, session_id, message.id, DeliveryStatus::Sent).await;
        let stored = repo.messages.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn failed_persist_marks_error_and_retry_recovers() {
        let repo = Arc::new(InMemoryMessages::default());
        repo.fail_insert.store(true, Ordering::SeqCst);
        let (ledger, _) = ledger(repo.clone());
        let session_id = Uuid::now_v7();

        let message = ledger
            .append(session_id, Sender::User, "flaky".to_string())
            .await;
        wait_for_status(&ledger, session_id, message.id, DeliveryStatus::Error).await;
        assert!(repo.messages.lock().unwrap().is_empty());

        // Retry while the store is still down fails and leaves the state.
        assert!(ledger.retry(session_id, message.id).await.is_err());

        repo.fail_insert.store(false, Ordering::SeqCst);
        ledger.retry(session_id, message.id).await.unwrap();
        wait_for_status(&ledger, session_id, message.id, DeliveryStatus::Sent).await;
        assert_eq!(repo.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retry_of_unknown_message_is_not_found() {
        let repo = Arc::new(InMemoryMessages::default());
        let (ledger, _) = ledger(repo);
        let result = ledger.retry(Uuid::now_v7(), Uuid::now_v7()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn page_with_same_cursor_is_idempotent() {
        let repo = Arc::new(InMemoryMessages::default());
        let (ledger, _) = ledger(repo.clone());
        let session_id = Uuid::now_v7();

        for i in 0..5 {
            let mut m =
                ChatMessage::new_sending(session_id, Sender::User, format!("m{i}"));
            m.status = DeliveryStatus::Sent;
            m.created_at = Utc::now() - chrono::Duration::seconds(100 - i);
            repo.messages.lock().unwrap().push(m);
        }

        let cursor = Some(PageCursor {
            created_at: Utc::now(),
            id: Uuid::now_v7(),
        });
        let first = ledger.page(session_id, cursor).await.unwrap();
        let second = ledger.page(session_id, cursor).await.unwrap();
        assert_eq!(
            first.messages.iter().map(|m| m.id).collect::<Vec<_>>(),
            second.messages.iter().map(|m| m.id).collect::<Vec<_>>()
        );
        assert!(!first.has_more);
    }

    #[tokio::test]
    async fn hydrate_seeds_view_from_store_once() {
        let repo = Arc::new(InMemoryMessages::default());
        // Page size 2 forces the backward walk across several pages.
        let ledger = MessageLedger::new(repo.clone(), EventBus::new(16), 2);
        let session_id = Uuid::now_v7();

        for i in 0..5 {
            let mut m = ChatMessage::new_sending(session_id, Sender::User, format!("m{i}"));
            m.status = DeliveryStatus::Sent;
            m.created_at = Utc::now() - chrono::Duration::seconds(100 - i);
            repo.messages.lock().unwrap().push(m);
        }

        ledger.hydrate(session_id).await.unwrap();
        let contents: Vec<String> = ledger
            .messages(session_id)
            .await
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);

        // Later calls leave the view alone.
        ledger.hydrate(session_id).await.unwrap();
        assert_eq!(ledger.messages(session_id).await.len(), 5);
    }

    #[tokio::test]
    async fn mark_read_updates_store_view_and_events() {
        let repo = Arc::new(InMemoryMessages::default());
        let (ledger, events) = ledger(repo.clone());
        let session_id = Uuid::now_v7();

        let reply = ledger
            .append(session_id, Sender::Assistant, "answer".to_string())
            .await;
        wait_for_status(&ledger, session_id, reply.id, DeliveryStatus::Sent).await;

        let mut rx = events.subscribe();
        ledger.mark_read(session_id, &[reply.id]).await.unwrap();

        wait_for_status(&ledger, session_id, reply.id, DeliveryStatus::Read).await;
        assert_eq!(
            repo.messages.lock().unwrap()[0].status,
            DeliveryStatus::Read
        );
        match rx.try_recv().unwrap() {
            EngineEvent::MarkedRead { count, .. } => assert_eq!(count, 1),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mark_read_with_empty_batch_is_a_no_op() {
        let repo = Arc::new(InMemoryMessages::default());
        let (ledger, events) = ledger(repo);
        let mut rx = events.subscribe();

        ledger.mark_read(Uuid::now_v7(), &[]).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn set_feedback_updates_store_and_view() {
        let repo = Arc::new(InMemoryMessages::default());
        let (ledger, _) = ledger(repo.clone());
        let session_id = Uuid::now_v7();

        let reply = ledger
            .append(session_id, Sender::Assistant, "answer".to_string())
            .await;
        wait_for_status(&ledger, session_id, reply.id, DeliveryStatus::Sent).await;

        ledger
            .set_feedback(session_id, reply.id, Some(Feedback::Like))
            .await
            .unwrap();

        assert_eq!(
            repo.messages.lock().unwrap()[0].feedback,
            Some(Feedback::Like)
        );
        let view = ledger.view(session_id);
        assert_eq!(
            view.lock().await.get(reply.id).unwrap().feedback,
            Some(Feedback::Like)
        );
    }
}
