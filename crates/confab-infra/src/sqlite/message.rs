//! SQLite message repository implementation.
//!
//! Implements `MessageRepository` from `confab-core`. Each message insert
//! also maintains the owning session's denormalized summary (message count,
//! last-message preview, `updated_at`) in the same transaction, and every
//! committed write publishes a fresh full snapshot of the session's
//! messages on the change feed.

use std::sync::Arc;

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use confab_core::ledger::{MessageRepository, Page, PageCursor};
use confab_types::error::RepositoryError;
use confab_types::event::FeedSnapshot;
use confab_types::inference::SourceRef;
use confab_types::message::{ChatMessage, DeliveryStatus, Feedback, MessageMetadata, Sender};
use confab_types::session::MessagePreview;

use super::pool::DatabasePool;
use super::session::{format_datetime, parse_datetime};
use crate::feed::ChangeFeed;

/// SQLite-backed implementation of `MessageRepository`.
pub struct SqliteMessageRepository {
    pool: DatabasePool,
    feed: Arc<ChangeFeed>,
}

impl SqliteMessageRepository {
    pub fn new(pool: DatabasePool, feed: Arc<ChangeFeed>) -> Self {
        Self { pool, feed }
    }

    /// All messages for a session in chronological order.
    async fn load_session_messages(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(msg_row.into_message()?);
        }
        Ok(messages)
    }

    async fn publish_snapshot(&self, session_id: Uuid) -> Result<(), RepositoryError> {
        let messages = self.load_session_messages(session_id).await?;
        self.feed.publish(FeedSnapshot {
            session_id,
            messages,
        });
        Ok(())
    }
}

/// Internal row type for mapping SQLite rows to domain ChatMessage.
struct MessageRow {
    id: String,
    session_id: String,
    sender: String,
    content: String,
    created_at: String,
    status: String,
    feedback: Option<String>,
    response_ms: Option<i64>,
    source_refs: Option<String>,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            sender: row.try_get("sender")?,
            content: row.try_get("content")?,
            created_at: row.try_get("created_at")?,
            status: row.try_get("status")?,
            feedback: row.try_get("feedback")?,
            response_ms: row.try_get("response_ms")?,
            source_refs: row.try_get("source_refs")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid message id: {e}")))?;
        let session_id = Uuid::parse_str(&self.session_id)
            .map_err(|e| RepositoryError::Query(format!("invalid session_id: {e}")))?;
        let sender: Sender = self
            .sender
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let status: DeliveryStatus = self
            .status
            .parse()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let feedback: Option<Feedback> = self
            .feedback
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: String| RepositoryError::Query(e))?;
        let created_at = parse_datetime(&self.created_at)?;

        let source_refs: Vec<SourceRef> = match self.source_refs.as_deref() {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| RepositoryError::Query(format!("invalid source_refs: {e}")))?,
            None => Vec::new(),
        };
        let metadata = if self.response_ms.is_some() || !source_refs.is_empty() {
            Some(MessageMetadata {
                response_ms: self.response_ms.map(|v| v as u64),
                source_refs,
            })
        } else {
            None
        };

        Ok(ChatMessage {
            id,
            session_id,
            sender,
            content: self.content,
            created_at,
            status,
            feedback,
            metadata,
        })
    }
}

impl MessageRepository for SqliteMessageRepository {
    async fn insert(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        let (response_ms, source_refs_json) = match &message.metadata {
            Some(meta) => {
                let json = if meta.source_refs.is_empty() {
                    None
                } else {
                    Some(
                        serde_json::to_string(&meta.source_refs)
                            .map_err(|e| RepositoryError::Query(e.to_string()))?,
                    )
                };
                (meta.response_ms.map(|v| v as i64), json)
            }
            None => (None, None),
        };

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO messages (id, session_id, sender, content, created_at, status, feedback, response_ms, source_refs)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(message.session_id.to_string())
        .bind(message.sender.to_string())
        .bind(&message.content)
        .bind(format_datetime(&message.created_at))
        .bind(message.status.to_string())
        .bind(message.feedback.map(|f| f.to_string()))
        .bind(response_ms)
        .bind(source_refs_json)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        // Maintain the session summary in the same transaction as the
        // message insert, so count and preview never drift.
        let preview = MessagePreview::from_content(&message.content, message.created_at);
        let result = sqlx::query(
            r#"UPDATE sessions
               SET message_count = message_count + 1,
                   last_message_preview = ?,
                   last_message_at = ?,
                   updated_at = ?
               WHERE id = ?"#,
        )
        .bind(&preview.excerpt)
        .bind(format_datetime(&preview.at))
        .bind(format_datetime(&Utc::now()))
        .bind(message.session_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        self.publish_snapshot(message.session_id).await
    }

    async fn page(
        &self,
        session_id: Uuid,
        cursor: Option<PageCursor>,
        limit: u32,
    ) -> Result<Page, RepositoryError> {
        // Fetch one extra row: its presence alone answers has_more, with
        // no separate count query.
        let fetch = limit as i64 + 1;
        let rows = match cursor {
            Some(cursor) => {
                // Rows sharing the boundary timestamp are split by id,
                // matching the ORDER BY, so none are skipped or repeated.
                sqlx::query(
                    r#"SELECT * FROM messages
                       WHERE session_id = ?
                         AND (created_at < ? OR (created_at = ? AND id < ?))
                       ORDER BY created_at DESC, id DESC
                       LIMIT ?"#,
                )
                .bind(session_id.to_string())
                .bind(format_datetime(&cursor.created_at))
                .bind(format_datetime(&cursor.created_at))
                .bind(cursor.id.to_string())
                .bind(fetch)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query(
                    r#"SELECT * FROM messages
                       WHERE session_id = ?
                       ORDER BY created_at DESC, id DESC
                       LIMIT ?"#,
                )
                .bind(session_id.to_string())
                .bind(fetch)
                .fetch_all(&self.pool.reader)
                .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let has_more = rows.len() > limit as usize;
        let mut messages = Vec::with_capacity(rows.len().min(limit as usize));
        for row in rows.iter().take(limit as usize) {
            let msg_row =
                MessageRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            messages.push(msg_row.into_message()?);
        }
        // Rows arrive newest-first; callers get chronological order.
        messages.reverse();

        Ok(Page { messages, has_more })
    }

    async fn mark_read(
        &self,
        session_id: Uuid,
        message_ids: &[Uuid],
    ) -> Result<(), RepositoryError> {
        if message_ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; message_ids.len()].join(", ");
        let sql = format!(
            r#"UPDATE messages SET status = 'read'
               WHERE session_id = ? AND sender = 'assistant' AND status = 'sent'
                 AND id IN ({placeholders})"#,
        );

        let mut query = sqlx::query(&sql).bind(session_id.to_string());
        for id in message_ids {
            query = query.bind(id.to_string());
        }
        let result = query
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() > 0 {
            self.publish_snapshot(session_id).await?;
        }
        Ok(())
    }

    async fn set_feedback(
        &self,
        message_id: Uuid,
        feedback: Option<Feedback>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE messages SET feedback = ? WHERE id = ?")
            .bind(feedback.map(|f| f.to_string()))
            .bind(message_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        let session_id: Option<(String,)> =
            sqlx::query_as("SELECT session_id FROM messages WHERE id = ?")
                .bind(message_id.to_string())
                .fetch_optional(&self.pool.reader)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
        if let Some((session_id,)) = session_id {
            let session_id = Uuid::parse_str(&session_id)
                .map_err(|e| RepositoryError::Query(format!("invalid session_id: {e}")))?;
            self.publish_snapshot(session_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use confab_core::registry::SessionRepository;
    use confab_core::sync::RecordFeed;
    use confab_types::session::ChatSession;

    use crate::sqlite::session::SqliteSessionRepository;

    async fn fixture() -> (
        SqliteMessageRepository,
        SqliteSessionRepository,
        Arc<ChangeFeed>,
        Uuid,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = DatabasePool::new(&url).await.unwrap();

        let feed = Arc::new(ChangeFeed::new(16));
        let sessions = SqliteSessionRepository::new(pool.clone());
        let messages = SqliteMessageRepository::new(pool, feed.clone());

        let session = ChatSession::new("user-1".to_string(), None);
        sessions.create(&session).await.unwrap();

        (messages, sessions, feed, session.id, dir)
    }

    fn sent_message(session_id: Uuid, sender: Sender, content: &str, age_secs: i64) -> ChatMessage {
        let mut msg = ChatMessage::new_sending(session_id, sender, content.to_string());
        msg.status = DeliveryStatus::Sent;
        msg.created_at = Utc::now() - chrono::Duration::seconds(age_secs);
        msg
    }

    #[tokio::test]
    async fn insert_maintains_session_summary() {
        let (repo, sessions, _feed, session_id, _dir) = fixture().await;

        repo.insert(&sent_message(session_id, Sender::User, "first question", 10))
            .await
            .unwrap();
        repo.insert(&sent_message(session_id, Sender::Assistant, "the answer", 5))
            .await
            .unwrap();

        let session = sessions.get(session_id).await.unwrap().unwrap();
        assert_eq!(session.message_count, 2);
        assert_eq!(
            session.last_message.as_ref().map(|p| p.excerpt.as_str()),
            Some("the answer")
        );
        assert!(session.updated_at > session.created_at);
    }

    #[tokio::test]
    async fn insert_publishes_full_snapshot() {
        let (repo, _sessions, feed, session_id, _dir) = fixture().await;
        let mut rx = feed.subscribe();

        repo.insert(&sent_message(session_id, Sender::User, "hello", 10))
            .await
            .unwrap();
        repo.insert(&sent_message(session_id, Sender::Assistant, "hi", 5))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.session_id, session_id);
        assert_eq!(first.messages.len(), 1);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.messages.len(), 2, "snapshots carry full state");
        assert_eq!(second.messages[0].content, "hello");
        assert_eq!(second.messages[1].content, "hi");
    }

    #[tokio::test]
    async fn insert_into_missing_session_fails_and_rolls_back() {
        let (repo, _sessions, _feed, _session_id, _dir) = fixture().await;

        let stray = sent_message(Uuid::now_v7(), Sender::User, "orphan", 0);
        assert!(repo.insert(&stray).await.is_err());
    }

    #[tokio::test]
    async fn metadata_roundtrips() {
        let (repo, _sessions, _feed, session_id, _dir) = fixture().await;

        let mut reply = sent_message(session_id, Sender::Assistant, "with sources", 0);
        reply.metadata = Some(MessageMetadata {
            response_ms: Some(842),
            source_refs: vec![SourceRef {
                title: "Handbook".to_string(),
                url: Some("https://example.org/handbook".to_string()),
            }],
        });
        repo.insert(&reply).await.unwrap();

        let loaded = repo.load_session_messages(session_id).await.unwrap();
        let metadata = loaded[0].metadata.as_ref().unwrap();
        assert_eq!(metadata.response_ms, Some(842));
        assert_eq!(metadata.source_refs.len(), 1);
        assert_eq!(metadata.source_refs[0].title, "Handbook");
    }

    #[tokio::test]
    async fn page_walks_backwards_in_chronological_chunks() {
        let (repo, _sessions, _feed, session_id, _dir) = fixture().await;

        for i in 0..7 {
            repo.insert(&sent_message(
                session_id,
                Sender::User,
                &format!("m{i}"),
                100 - i,
            ))
            .await
            .unwrap();
        }

        let newest = repo.page(session_id, None, 3).await.unwrap();
        assert!(newest.has_more);
        assert_eq!(
            newest.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["m4", "m5", "m6"]
        );

        let cursor = Some(PageCursor::from(&newest.messages[0]));
        let middle = repo.page(session_id, cursor, 3).await.unwrap();
        assert!(middle.has_more);
        assert_eq!(
            middle.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["m1", "m2", "m3"]
        );

        let oldest = repo
            .page(session_id, Some(PageCursor::from(&middle.messages[0])), 3)
            .await
            .unwrap();
        assert!(!oldest.has_more);
        assert_eq!(
            oldest.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["m0"]
        );
    }

    #[tokio::test]
    async fn page_with_same_cursor_is_idempotent() {
        let (repo, _sessions, _feed, session_id, _dir) = fixture().await;

        for i in 0..5 {
            repo.insert(&sent_message(
                session_id,
                Sender::User,
                &format!("m{i}"),
                100 - i,
            ))
            .await
            .unwrap();
        }

        let cursor = Some(PageCursor {
            created_at: Utc::now(),
            id: Uuid::now_v7(),
        });
        let first = repo.page(session_id, cursor, 3).await.unwrap();
        let second = repo.page(session_id, cursor, 3).await.unwrap();
        assert_eq!(
            first.messages.iter().map(|m| m.id).collect::<Vec<_>>(),
            second.messages.iter().map(|m| m.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn page_boundary_with_equal_timestamps_skips_nothing() {
        let (repo, _sessions, _feed, session_id, _dir) = fixture().await;

        // Four messages sharing one timestamp, walked in pages of two.
        let at = Utc::now() - chrono::Duration::seconds(50);
        for i in 0..4 {
            let mut msg = sent_message(session_id, Sender::User, &format!("m{i}"), 0);
            msg.created_at = at;
            repo.insert(&msg).await.unwrap();
        }

        let newest = repo.page(session_id, None, 2).await.unwrap();
        assert!(newest.has_more);
        let older = repo
            .page(session_id, Some(PageCursor::from(&newest.messages[0])), 2)
            .await
            .unwrap();
        assert!(!older.has_more);

        let mut seen: Vec<&str> = newest
            .messages
            .iter()
            .chain(older.messages.iter())
            .map(|m| m.content.as_str())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec!["m0", "m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn exact_page_boundary_reports_no_more() {
        let (repo, _sessions, _feed, session_id, _dir) = fixture().await;

        for i in 0..3 {
            repo.insert(&sent_message(
                session_id,
                Sender::User,
                &format!("m{i}"),
                100 - i,
            ))
            .await
            .unwrap();
        }

        let page = repo.page(session_id, None, 3).await.unwrap();
        assert_eq!(page.messages.len(), 3);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn mark_read_only_touches_eligible_messages() {
        let (repo, _sessions, _feed, session_id, _dir) = fixture().await;

        let user = sent_message(session_id, Sender::User, "question", 10);
        let reply = sent_message(session_id, Sender::Assistant, "answer", 5);
        repo.insert(&user).await.unwrap();
        repo.insert(&reply).await.unwrap();

        repo.mark_read(session_id, &[user.id, reply.id]).await.unwrap();

        let messages = repo.load_session_messages(session_id).await.unwrap();
        assert_eq!(messages[0].status, DeliveryStatus::Sent, "user untouched");
        assert_eq!(messages[1].status, DeliveryStatus::Read);

        // Second flush with the same ids changes nothing.
        repo.mark_read(session_id, &[user.id, reply.id]).await.unwrap();
    }

    #[tokio::test]
    async fn set_feedback_roundtrips_and_clears() {
        let (repo, _sessions, _feed, session_id, _dir) = fixture().await;

        let reply = sent_message(session_id, Sender::Assistant, "answer", 0);
        repo.insert(&reply).await.unwrap();

        repo.set_feedback(reply.id, Some(Feedback::Like)).await.unwrap();
        let messages = repo.load_session_messages(session_id).await.unwrap();
        assert_eq!(messages[0].feedback, Some(Feedback::Like));

        repo.set_feedback(reply.id, None).await.unwrap();
        let messages = repo.load_session_messages(session_id).await.unwrap();
        assert!(messages[0].feedback.is_none());

        assert!(matches!(
            repo.set_feedback(Uuid::now_v7(), Some(Feedback::Dislike)).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
