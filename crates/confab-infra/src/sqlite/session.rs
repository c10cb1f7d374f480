//! SQLite session repository implementation.
//!
//! Implements `SessionRepository` from `confab-core` using sqlx with the
//! split read/write pool: raw queries, private Row structs, reads on the
//! reader pool and writes on the single-connection writer.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use confab_core::registry::SessionRepository;
use confab_types::error::RepositoryError;
use confab_types::session::{ChatSession, MessagePreview, SessionFilter};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SessionRepository`.
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Internal row type for mapping SQLite rows to domain ChatSession.
struct SessionRow {
    id: String,
    owner_id: String,
    title: String,
    category: Option<String>,
    pinned: i64,
    archived: i64,
    message_count: i64,
    last_message_preview: Option<String>,
    last_message_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            category: row.try_get("category")?,
            pinned: row.try_get("pinned")?,
            archived: row.try_get("archived")?,
            message_count: row.try_get("message_count")?,
            last_message_preview: row.try_get("last_message_preview")?,
            last_message_at: row.try_get("last_message_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_session(self) -> Result<ChatSession, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid session id: {e}")))?;
        let created_at = parse_datetime(&self.created_at)?;
        let updated_at = parse_datetime(&self.updated_at)?;
        let last_message = match (self.last_message_preview, self.last_message_at) {
            (Some(excerpt), Some(at)) => Some(MessagePreview {
                excerpt,
                at: parse_datetime(&at)?,
            }),
            _ => None,
        };

        Ok(ChatSession {
            id,
            owner_id: self.owner_id,
            title: self.title,
            category: self.category,
            pinned: self.pinned != 0,
            archived: self.archived != 0,
            message_count: self.message_count as u32,
            last_message,
            created_at,
            updated_at,
        })
    }
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO sessions (id, owner_id, title, category, pinned, archived, message_count, last_message_preview, last_message_at, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session.id.to_string())
        .bind(&session.owner_id)
        .bind(&session.title)
        .bind(&session.category)
        .bind(session.pinned as i64)
        .bind(session.archived as i64)
        .bind(session.message_count as i64)
        .bind(session.last_message.as_ref().map(|p| p.excerpt.clone()))
        .bind(session.last_message.as_ref().map(|p| format_datetime(&p.at)))
        .bind(format_datetime(&session.created_at))
        .bind(format_datetime(&session.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ChatSession>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let session_row =
                    SessionRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        owner_id: &str,
        filter: SessionFilter,
    ) -> Result<Vec<ChatSession>, RepositoryError> {
        let sql = match filter {
            SessionFilter::All => {
                "SELECT * FROM sessions WHERE owner_id = ? ORDER BY updated_at DESC"
            }
            SessionFilter::Active => {
                "SELECT * FROM sessions WHERE owner_id = ? AND archived = 0 ORDER BY updated_at DESC"
            }
            SessionFilter::Archived => {
                "SELECT * FROM sessions WHERE owner_id = ? AND archived = 1 ORDER BY updated_at DESC"
            }
        };

        let rows = sqlx::query(sql)
            .bind(owner_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row =
                SessionRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            sessions.push(session_row.into_session()?);
        }

        Ok(sessions)
    }

    async fn rename(&self, id: Uuid, title: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE sessions SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn set_pinned(&self, id: Uuid, pinned: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE sessions SET pinned = ? WHERE id = ?")
            .bind(pinned as i64)
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE sessions SET archived = ? WHERE id = ?")
            .bind(archived as i64)
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        // ON DELETE CASCADE removes the session's messages in the same
        // statement, so the write is atomic.
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}
