//! HTTP client for the inference endpoint.
//!
//! Thin transport adapter: serializes the request, classifies transport
//! and status failures into the gateway's error taxonomy, and decodes the
//! response body. Timeout and retry policy live in the gateway, not here.

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use confab_core::gateway::InferenceClient;
use confab_types::error::GatewayError;
use confab_types::inference::{InferenceRequest, InferenceResponse};

/// HTTP implementation of [`InferenceClient`].
///
/// The bearer token, when configured, is wrapped in
/// [`secrecy::SecretString`] and only exposed while building request
/// headers; it never appears in Debug output or logs.
pub struct HttpInferenceClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpInferenceClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    /// Attach a bearer token sent with every request.
    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    fn url(&self) -> String {
        format!("{}/ask", self.base_url)
    }
}

/// Map an HTTP status to the gateway taxonomy: client-side rejections are
/// not retried, server-side failures are.
fn classify_status(status: StatusCode) -> Option<GatewayError> {
    if status.is_client_error() {
        Some(GatewayError::Validation(format!(
            "inference endpoint rejected request: {status}"
        )))
    } else if status.is_server_error() {
        Some(GatewayError::Transient(format!(
            "inference endpoint failed: {status}"
        )))
    } else {
        None
    }
}

impl InferenceClient for HttpInferenceClient {
    fn infer(
        &self,
        request: &InferenceRequest,
    ) -> impl std::future::Future<Output = Result<InferenceResponse, GatewayError>> + Send {
        let url = self.url();
        let mut builder = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        let call = builder.send();
        async move {
            debug!(%url, "sending inference request");
            let response = call
                .await
                .map_err(|e| GatewayError::Transient(e.to_string()))?;

            if let Some(err) = classify_status(response.status()) {
                return Err(err);
            }

            response
                .json::<InferenceResponse>()
                .await
                .map_err(|e| GatewayError::Malformed(e.to_string()))
        }
    }
}
