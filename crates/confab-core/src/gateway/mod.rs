//! Response Gateway: validated, retrying, cached access to the inference
//! endpoint.
//!
//! The gateway owns the full lifecycle of one question/answer exchange:
//! input validation, a per-attempt timeout, bounded retry with exponential
//! backoff for transient failures, response shape validation, latency
//! publication, and a first-turn answer cache. The actual exchange runs on
//! a spawned task, so a caller that stops waiting (user pressed stop)
//! simply discards the result; the in-flight call is never aborted
//! mid-request and still warms the cache.

mod cache;
mod client;

pub use cache::{CacheKey, ResponseCache};
pub use client::InferenceClient;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use confab_types::config::GatewaySettings;
use confab_types::error::GatewayError;
use confab_types::event::EngineEvent;
use confab_types::inference::{Answer, GenerationParams, InferenceRequest, InferenceResponse};

use crate::event::EventBus;

/// Runtime configuration for the gateway, derived from [`GatewaySettings`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub generation: GenerationParams,
}

impl From<&GatewaySettings> for GatewayConfig {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            timeout: Duration::from_millis(settings.timeout_ms),
            max_retries: settings.max_retries,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            generation: settings.generation.clone(),
        }
    }
}

/// The Response Gateway. Cheap to clone; all state is shared.
pub struct ResponseGateway<C> {
    inner: Arc<GatewayInner<C>>,
}

impl<C> Clone for ResponseGateway<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct GatewayInner<C> {
    client: C,
    config: GatewayConfig,
    cache: ResponseCache,
    events: EventBus,
}

impl<C: InferenceClient + 'static> ResponseGateway<C> {
    pub fn new(client: C, config: GatewayConfig, cache: ResponseCache, events: EventBus) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                client,
                config,
                cache,
                events,
            }),
        }
    }

    /// Ask a question, optionally scoped to a session for multi-turn
    /// context.
    ///
    /// Returns the validated answer or the first non-retryable failure.
    /// Dropping the returned future abandons the exchange without
    /// cancelling the underlying request.
    pub async fn send(
        &self,
        question: &str,
        session_context: Option<Uuid>,
    ) -> Result<Answer, GatewayError> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::Validation(
                "question must not be empty".to_string(),
            ));
        }

        let first_turn = session_context.is_none();
        let key = CacheKey::new(trimmed, first_turn);
        if first_turn {
            if let Some(answer) = self.inner.cache.get(&key) {
                debug!("serving cached first-turn answer");
                return Ok(answer);
            }
        }

        let request = InferenceRequest {
            question: trimmed.to_string(),
            session_context,
            generation_params: self.inner.config.generation.clone(),
        };

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.send_with_retry(request).await });
        handle
            .await
            .map_err(|e| GatewayError::Transient(format!("inference task failed: {e}")))?
    }
}

impl<C: InferenceClient> GatewayInner<C> {
    async fn send_with_retry(&self, request: InferenceRequest) -> Result<Answer, GatewayError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            match self.attempt(&request).await {
                Ok(answer) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    self.events
                        .publish(EngineEvent::ResponseLatency { ms: elapsed_ms });
                    if request.session_context.is_none() {
                        self.cache
                            .insert(CacheKey::new(&request.question, true), answer.clone());
                    }
                    return Ok(answer);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff_base * 2u32.saturating_pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient inference failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One attempt: hard timeout around the client call, then response
    /// shape validation. Timeouts are surfaced immediately and never
    /// retried.
    async fn attempt(&self, request: &InferenceRequest) -> Result<Answer, GatewayError> {
        let response = tokio::time::timeout(self.config.timeout, self.client.infer(request))
            .await
            .map_err(|_| GatewayError::Timeout {
                timeout_ms: self.config.timeout.as_millis() as u64,
            })??;
        into_answer(response)
    }
}

/// Validate a raw endpoint response into an [`Answer`].
///
/// A server-reported error is treated as transient (the endpoint was
/// reachable but declined); a body with neither text nor error is
/// malformed.
fn into_answer(response: InferenceResponse) -> Result<Answer, GatewayError> {
    if let Some(error) = response.error {
        return Err(GatewayError::Transient(error));
    }
    match response.text {
        Some(text) => Ok(Answer {
            text,
            source_refs: response.source_refs.unwrap_or_default(),
        }),
        None => Err(GatewayError::Malformed(
            "response carried neither text nor error".to_string(),
        )),
    }
}
