use thiserror::Error;
use uuid::Uuid;

/// Errors from the Response Gateway.
///
/// `Validation` and `Timeout` are never retried; `Transient` is retried
/// with exponential backoff up to a configured bound, then surfaced.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid question: {0}")]
    Validation(String),

    #[error("inference request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("transient inference failure: {0}")]
    Transient(String),

    #[error("malformed inference response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Whether the gateway may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

/// Errors from repository operations (used by the port traits in
/// confab-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the Streaming Revealer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("a reveal is already active on this surface")]
    ConcurrentStream,
}

/// Reconciliation anomalies.
///
/// Conflicts are resolved automatically (authoritative record wins) and
/// logged for diagnosis; they never block the merged view.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(
        "ambiguous merge in session {session_id}: {candidates} local candidates \
         matched authoritative message {authoritative_id}"
    )]
    Conflict {
        session_id: Uuid,
        authoritative_id: Uuid,
        candidates: usize,
    },
}
