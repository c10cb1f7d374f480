//! Inference endpoint request/response shapes.
//!
//! The inference endpoint is an external collaborator: the engine sends a
//! question (optionally scoped to a session for multi-turn context) with
//! bounded generation parameters and receives back answer text plus
//! optional source attributions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generation parameters bounding a single inference request.
///
/// Bounded on purpose: predictable latency matters more than long-form
/// output for a chat surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f64,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            stop_sequences: None,
        }
    }
}

/// Request sent to the inference endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub question: String,
    /// Session id for continuing conversations; absent for first-turn
    /// (session-less) queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_context: Option<Uuid>,
    pub generation_params: GenerationParams,
}

/// A source attribution returned alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Raw response from the inference endpoint.
///
/// `text` absent with `error` also absent is a malformed response and is
/// surfaced as a generic failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InferenceResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_refs: Option<Vec<SourceRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A validated, complete answer as delivered by the Response Gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_refs: Vec<SourceRef>,
}
