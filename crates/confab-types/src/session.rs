//! Session types for Confab.
//!
//! A session is a persistent, named conversation thread owned by one user.
//! The owning user id comes from an external identity provider and is
//! treated as an opaque string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum length of the last-message excerpt kept on a session.
pub const PREVIEW_MAX_CHARS: usize = 120;

/// Excerpt of the most recent message, denormalized onto the session for
/// cheap list rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePreview {
    pub excerpt: String,
    pub at: DateTime<Utc>,
}

impl MessagePreview {
    /// Build a preview from full message content, truncating to
    /// [`PREVIEW_MAX_CHARS`] on a char boundary.
    pub fn from_content(content: &str, at: DateTime<Utc>) -> Self {
        let excerpt = if content.chars().count() > PREVIEW_MAX_CHARS {
            let end: usize = content
                .char_indices()
                .nth(PREVIEW_MAX_CHARS)
                .map(|(i, _)| i)
                .unwrap_or(content.len());
            format!("{}...", &content[..end])
        } else {
            content.to_string()
        };
        Self { excerpt, at }
    }
}

/// Filter for session listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionFilter {
    /// Active and archived sessions.
    All,
    /// Sessions not archived.
    Active,
    /// Archived sessions only.
    Archived,
}

/// A chat session between a user and the assistant.
///
/// `message_count` always equals the number of persisted messages for the
/// session, and `updated_at` is monotonically non-decreasing; both are
/// maintained by the message repository in the same transaction as each
/// message insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub category: Option<String>,
    pub pinned: bool,
    pub archived: bool,
    pub message_count: u32,
    pub last_message: Option<MessagePreview>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Create a fresh session with zero messages.
    ///
    /// When `title` is `None` the default "New Chat — {date}" title is used.
    pub fn new(owner_id: String, title: Option<String>) -> Self {
        let now = Utc::now();
        let title = title.unwrap_or_else(|| format!("New Chat — {}", now.format("%Y-%m-%d")));
        Self {
            id: Uuid::now_v7(),
            owner_id,
            title,
            category: None,
            pinned: false,
            archived: false,
            message_count: 0,
            last_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}
