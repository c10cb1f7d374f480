//! Message types for Confab.
//!
//! A message is one turn (user or assistant) within a session. Messages are
//! created locally in the `sending` state and transition through the
//! delivery state machine as persistence and reconciliation progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::inference::SourceRef;

/// Author of a message.
///
/// Maps to the CHECK constraint in the SQLite schema:
/// `CHECK (sender IN ('user', 'assistant'))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "assistant" => Ok(Sender::Assistant),
            other => Err(format!("invalid sender: '{other}'")),
        }
    }
}

/// Delivery state of a message.
///
/// `Sending` and `Error` are local-only optimistic states; only `Sent` and
/// `Read` are ever written to the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Created locally, durable write still in flight.
    Sending,
    /// Acknowledged by the durable store.
    Sent,
    /// The durable write failed; the message stays visible with a retry
    /// affordance.
    Error,
    /// Observed by the consuming viewport.
    Read,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryStatus::Sending => write!(f, "sending"),
            DeliveryStatus::Sent => write!(f, "sent"),
            DeliveryStatus::Error => write!(f, "error"),
            DeliveryStatus::Read => write!(f, "read"),
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sending" => Ok(DeliveryStatus::Sending),
            "sent" => Ok(DeliveryStatus::Sent),
            "error" => Ok(DeliveryStatus::Error),
            "read" => Ok(DeliveryStatus::Read),
            other => Err(format!("invalid delivery status: '{other}'")),
        }
    }
}

/// User feedback on an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Like,
    Dislike,
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Like => write!(f, "like"),
            Feedback::Dislike => write!(f, "dislike"),
        }
    }
}

impl FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "like" => Ok(Feedback::Like),
            "dislike" => Ok(Feedback::Dislike),
            other => Err(format!("invalid feedback: '{other}'")),
        }
    }
}

/// Metadata attached to assistant messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Response latency in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_ms: Option<u64>,
    /// Source attributions returned by the inference endpoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_refs: Vec<SourceRef>,
}

/// A single message within a chat session.
///
/// Within a session, messages are totally ordered by `created_at`. Once a
/// message reaches `Sent`, `content` and `created_at` are immutable; only
/// `status` (to `Read`) and `feedback` may change afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ChatMessage {
    /// Create a new optimistic message in the `Sending` state with a
    /// client-generated time-sortable id.
    pub fn new_sending(session_id: Uuid, sender: Sender, content: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            sender,
            content,
            created_at: Utc::now(),
            status: DeliveryStatus::Sending,
            feedback: None,
            metadata: None,
        }
    }

    /// Whether this message is eligible for viewport read tracking:
    /// assistant-authored and delivered but not yet read.
    pub fn read_eligible(&self) -> bool {
        self.sender == Sender::Assistant && self.status == DeliveryStatus::Sent
    }
}
