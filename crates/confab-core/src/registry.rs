//! Session Registry: CRUD and listing of chat sessions.
//!
//! Sessions are persisted before `create` returns; there is no local-only
//! session state. `rename`, `archive`, and `set_pinned` are idempotent
//! partial updates that never touch the message count or last-message
//! preview. `delete` cascades to the session's messages atomically.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use confab_types::error::RepositoryError;
use confab_types::event::EngineEvent;
use confab_types::session::{ChatSession, SessionFilter};

use crate::event::EventBus;

/// Port trait for session persistence.
///
/// `list` returns sessions for one owner ordered by most-recently-updated
/// first. `delete` must remove the session and all owned messages in one
/// atomic write.
pub trait SessionRepository: Send + Sync {
    fn create(
        &self,
        session: &ChatSession,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<ChatSession>, RepositoryError>> + Send;

    fn list(
        &self,
        owner_id: &str,
        filter: SessionFilter,
    ) -> impl Future<Output = Result<Vec<ChatSession>, RepositoryError>> + Send;

    fn rename(
        &self,
        id: Uuid,
        title: &str,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn set_pinned(
        &self,
        id: Uuid,
        pinned: bool,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn set_archived(
        &self,
        id: Uuid,
        archived: bool,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn delete(&self, id: Uuid) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid session title: {0}")]
    Validation(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// The Session Registry service.
pub struct SessionRegistry<R> {
    repo: Arc<R>,
    events: EventBus,
}

impl<R> Clone for SessionRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            events: self.events.clone(),
        }
    }
}

impl<R: SessionRepository> SessionRegistry<R> {
    pub fn new(repo: Arc<R>, events: EventBus) -> Self {
        Self { repo, events }
    }

    /// Create and persist a new session. The session only exists once the
    /// durable write succeeds.
    pub async fn create(
        &self,
        owner_id: &str,
        title: Option<String>,
    ) -> Result<ChatSession, RegistryError> {
        let title = match title {
            Some(t) => {
                let trimmed = t.trim();
                if trimmed.is_empty() {
                    return Err(RegistryError::Validation("title must not be empty".into()));
                }
                Some(trimmed.to_string())
            }
            None => None,
        };

        let session = ChatSession::new(owner_id.to_string(), title);
        self.repo.create(&session).await?;
        info!(session_id = %session.id, "session created");
        self.events.publish(EngineEvent::SessionCreated {
            session_id: session.id,
        });
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ChatSession>, RegistryError> {
        Ok(self.repo.get(id).await?)
    }

    /// List sessions for an owner, most-recently-updated first.
    pub async fn list(
        &self,
        owner_id: &str,
        filter: SessionFilter,
    ) -> Result<Vec<ChatSession>, RegistryError> {
        Ok(self.repo.list(owner_id, filter).await?)
    }

    /// Rename a session. Partial update: message count and preview are
    /// untouched.
    pub async fn rename(&self, id: Uuid, title: &str) -> Result<(), RegistryError> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(RegistryError::Validation("title must not be empty".into()));
        }
        self.repo.rename(id, trimmed).await?;
        Ok(())
    }

    pub async fn set_pinned(&self, id: Uuid, pinned: bool) -> Result<(), RegistryError> {
        Ok(self.repo.set_pinned(id, pinned).await?)
    }

    pub async fn set_archived(&self, id: Uuid, archived: bool) -> Result<(), RegistryError> {
        Ok(self.repo.set_archived(id, archived).await?)
    }

    /// Delete a session and all of its messages.
    pub async fn delete(&self, id: Uuid) -> Result<(), RegistryError> {
        self.repo.delete(id).await?;
        info!(session_id = %id, "session deleted");
        self.events
            .publish(EngineEvent::SessionDeleted { session_id: id });
        Ok(())
    }
}
