//! HTTP judge backends.
//!
//! [`ollama`] talks to a local Ollama-compatible `/api/generate` endpoint;
//! [`hosted`] talks to a Gemini-style `generateContent` endpoint.

pub mod hosted;
pub mod ollama;

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::StatusCode;

use crate::error::BackendError;

pub use hosted::HostedBackend;
pub use ollama::OllamaBackend;

/// Build the shared HTTP client with a per-request timeout.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| BackendError::Transport(e.to_string()))
}

pub(crate) fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Ensure the response has a success status code. 429 becomes
/// [`BackendError::RateLimited`]; other failures carry status and body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(BackendError::RateLimited);
    }
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(BackendError::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}
