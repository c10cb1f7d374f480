//! Port trait for the inference endpoint.

use std::future::Future;

use confab_types::error::GatewayError;
use confab_types::inference::{InferenceRequest, InferenceResponse};

/// A client capable of performing one inference call.
///
/// Implementations classify their own transport failures: network and
/// server-side (5xx) failures become [`GatewayError::Transient`] so the
/// gateway will retry them, while client-side (4xx) failures become
/// [`GatewayError::Validation`] and undecodable bodies become
/// [`GatewayError::Malformed`].
pub trait InferenceClient: Send + Sync {
    fn infer(
        &self,
        request: &InferenceRequest,
    ) -> impl Future<Output = Result<InferenceResponse, GatewayError>> + Send;
}
