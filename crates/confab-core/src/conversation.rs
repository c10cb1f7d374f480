//! Conversation orchestrator: one user turn from question to revealed,
//! persisted answer.
//!
//! The user's message is appended (and therefore visible) before the
//! assistant reply is requested. Gateway failures never propagate past
//! this boundary: they become a visible assistant-side failure message,
//! so the surface always shows something. The assistant reply is only
//! appended once the reveal finishes, carrying whatever text was actually
//! displayed.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use confab_types::error::{GatewayError, StreamError};
use confab_types::inference::SourceRef;
use confab_types::message::{ChatMessage, MessageMetadata, Sender};

use crate::gateway::{InferenceClient, ResponseGateway};
use crate::ledger::{MessageLedger, MessageRepository};
use crate::reveal::{RevealHandle, Revealer};

/// Errors the caller must handle before a turn starts.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("invalid question: {0}")]
    Validation(String),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Carry-over from a successful gateway call, needed to persist the
/// assistant message after the reveal ends.
#[derive(Debug)]
pub struct TurnMeta {
    session_id: Uuid,
    latency_ms: u64,
    source_refs: Vec<SourceRef>,
}

/// A turn whose answer is currently being revealed.
pub struct ActiveTurn {
    pub reveal: RevealHandle,
    pub meta: TurnMeta,
}

/// How a send resolved.
pub enum SendResult {
    /// The answer arrived and is being revealed; finalize with the
    /// revealed text when the reveal ends.
    Streaming(ActiveTurn),
    /// The gateway failed; a visible assistant-side failure message was
    /// appended in place of an answer.
    Failed {
        notice: ChatMessage,
        error: GatewayError,
    },
}

pub struct Conversation<C, R> {
    gateway: ResponseGateway<C>,
    ledger: Arc<MessageLedger<R>>,
    revealer: Revealer,
}

impl<C, R> Conversation<C, R>
where
    C: InferenceClient + 'static,
    R: MessageRepository + 'static,
{
    pub fn new(
        gateway: ResponseGateway<C>,
        ledger: Arc<MessageLedger<R>>,
        revealer: Revealer,
    ) -> Self {
        Self {
            gateway,
            ledger,
            revealer,
        }
    }

    pub fn ledger(&self) -> &Arc<MessageLedger<R>> {
        &self.ledger
    }

    /// Send one user turn in a session.
    ///
    /// Appends the user message first, then asks the gateway. The first
    /// turn of a session carries no session context, so it goes through
    /// the gateway's session-less (cacheable) path; whether a turn is the
    /// first is decided against the hydrated view, so a resumed session
    /// always carries its context. A failed gateway call resolves to
    /// [`SendResult::Failed`]; the user's own message keeps its normal
    /// delivery lifecycle and is never resent automatically.
    pub async fn send(
        &self,
        session_id: Uuid,
        question: &str,
    ) -> Result<SendResult, ConversationError> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Err(ConversationError::Validation(
                "question must not be empty".to_string(),
            ));
        }

        // A session whose history cannot be loaded is not treated as new.
        let first_turn = match self.ledger.hydrate(session_id).await {
            Ok(()) => self.ledger.messages(session_id).await.is_empty(),
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "history load failed");
                false
            }
        };
        self.ledger
            .append(session_id, Sender::User, trimmed.to_string())
            .await;

        let context = if first_turn { None } else { Some(session_id) };
        let started = Instant::now();
        match self.gateway.send(trimmed, context).await {
            Ok(answer) => {
                let reveal = self.revealer.begin(answer.text)?;
                Ok(SendResult::Streaming(ActiveTurn {
                    reveal,
                    meta: TurnMeta {
                        session_id,
                        latency_ms: started.elapsed().as_millis() as u64,
                        source_refs: answer.source_refs,
                    },
                }))
            }
            Err(error) => {
                warn!(session_id = %session_id, error = %error, "turn failed");
                let notice = self
                    .ledger
                    .append(session_id, Sender::Assistant, failure_notice(&error))
                    .await;
                Ok(SendResult::Failed { notice, error })
            }
        }
    }

    /// Persist the assistant message once its reveal has ended, with
    /// whatever text was displayed (full or partial).
    ///
    /// Returns `None` when nothing had been revealed yet, in which case no
    /// message is appended.
    pub async fn finalize(&self, meta: TurnMeta, revealed_text: String) -> Option<ChatMessage> {
        if revealed_text.is_empty() {
            return None;
        }
        let mut message =
            ChatMessage::new_sending(meta.session_id, Sender::Assistant, revealed_text);
        message.metadata = Some(MessageMetadata {
            response_ms: Some(meta.latency_ms),
            source_refs: meta.source_refs,
        });
        Some(self.ledger.append_message(message).await)
    }
}

/// Short human-readable text shown in place of an answer when the gateway
/// fails.
fn failure_notice(error: &GatewayError) -> String {
    match error {
        GatewayError::Timeout { .. } => {
            "The assistant is taking too long to respond. Please try again.".to_string()
        }
        _ => "Sorry, something went wrong while fetching a response. Please try again.".to_string(),
    }
}
