//! Engine events and authoritative feed snapshots.
//!
//! Cross-component signaling goes through a typed broadcast bus carrying
//! [`EngineEvent`] values, with defined publishers and subscribers rather
//! than ad hoc global events. The authoritative store pushes
//! [`FeedSnapshot`]s -- the full current record set for a session -- on
//! every committed change.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::ChatMessage;

/// Events published on the engine's internal bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A session was created and persisted.
    SessionCreated { session_id: Uuid },

    /// A session and all its messages were deleted.
    SessionDeleted { session_id: Uuid },

    /// An optimistic message entered a session view.
    MessageAppended { session_id: Uuid, message_id: Uuid },

    /// Observed inference latency for a successful gateway call.
    ///
    /// Fire-and-forget: publication never blocks the response path.
    ResponseLatency { ms: u64 },

    /// A batch of assistant messages was marked read.
    MarkedRead { session_id: Uuid, count: usize },
}

/// The full current message set for one session, as pushed by the
/// authoritative feed after every committed write.
///
/// Eventually-consistent push of current state: consumers merge snapshots
/// rather than applying deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub session_id: Uuid,
    pub messages: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Sender;

    #[test]
    fn test_engine_event_serde_tag() {
        let event = EngineEvent::ResponseLatency { ms: 420 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"response_latency\""));
        assert!(json.contains("420"));
    }

    #[test]
    fn test_feed_snapshot_roundtrip() {
        let session_id = Uuid::now_v7();
        let snapshot = FeedSnapshot {
            session_id,
            messages: vec![ChatMessage::new_sending(
                session_id,
                Sender::User,
                "hello".to_string(),
            )],
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: FeedSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session_id, session_id);
        assert_eq!(parsed.messages.len(), 1);
    }
}
