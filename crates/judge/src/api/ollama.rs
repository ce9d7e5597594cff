//! Local Ollama-compatible backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::{encode_image, parse_response};
use crate::backend::{BackendKind, Capability, JudgeBackend, JudgeRequest};
use crate::error::BackendError;

/// Body of `POST /api/generate`.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
}

/// Non-streaming `/api/generate` response.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// A model served by a local Ollama instance.
pub struct OllamaBackend {
    client: reqwest::Client,
    api_url: String,
    model: String,
    kind: BackendKind,
    vision: bool,
    name: String,
}

impl OllamaBackend {
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:11434`.
    /// * `vision` - Whether the model accepts images.
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        model: String,
        kind: BackendKind,
        vision: bool,
    ) -> Self {
        let name = format!("ollama:{model}");
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
            kind,
            vision,
            name,
        }
    }

    fn body<'a>(&'a self, request: &'a JudgeRequest) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            images: request
                .images
                .iter()
                .map(|img| encode_image(&img.bytes))
                .collect(),
            stream: false,
        }
    }
}

#[async_trait]
impl JudgeBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Text => true,
            Capability::Multimodal => self.vision,
        }
    }

    async fn complete(
        &self,
        request: &JudgeRequest,
        _credential: Option<&str>,
    ) -> Result<String, BackendError> {
        if !self.supports(request.capability()) {
            return Err(BackendError::Unsupported);
        }

        let response = self
            .client
            .post(format!("{}/api/generate", self.api_url))
            .json(&self.body(request))
            .send()
            .await?;

        let parsed: GenerateResponse = parse_response(response).await?;
        Ok(parsed.response)
    }
}
