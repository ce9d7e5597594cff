//! Hosted multimodal judge (Gemini-style `generateContent`).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::api::{encode_image, parse_response};
use crate::backend::{BackendKind, Capability, JudgeBackend, JudgeRequest};
use crate::error::BackendError;

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// A hosted model that authenticates with a rotating API key.
pub struct HostedBackend {
    client: reqwest::Client,
    api_url: String,
    model: String,
    name: String,
}

impl HostedBackend {
    /// * `api_url` - Base URL, e.g. `https://generativelanguage.googleapis.com`.
    pub fn new(client: reqwest::Client, api_url: String, model: String) -> Self {
        let name = format!("hosted:{model}");
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
            name,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_url, self.model)
    }

    fn body(request: &JudgeRequest) -> serde_json::Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        parts.extend(request.images.iter().map(|img| {
            json!({
                "inline_data": {
                    "mime_type": img.mime_type,
                    "data": encode_image(&img.bytes),
                }
            })
        }));
        json!({ "contents": [{ "parts": parts }] })
    }
}

#[async_trait]
impl JudgeBackend for HostedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Hosted
    }

    fn supports(&self, _capability: Capability) -> bool {
        true
    }

    fn requires_credential(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        request: &JudgeRequest,
        credential: Option<&str>,
    ) -> Result<String, BackendError> {
        let key = credential.ok_or(BackendError::MissingCredential)?;

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", key)])
            .json(&Self::body(request))
            .send()
            .await?;

        let parsed: GenerateContentResponse = parse_response(response).await?;
        parsed
            .into_text()
            .ok_or_else(|| BackendError::Decode("response has no text candidate".into()))
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::JudgeImage;

    use super::*;

    #[test]
    fn body_has_text_then_inline_images() {
        let request = JudgeRequest::multimodal(
            "judge",
            vec![JudgeImage {
                mime_type: "image/webp".into(),
                bytes: b"koma".to_vec(),
            }],
        );
        let body = HostedBackend::body(&request);
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "judge");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/webp");
        assert_eq!(parts[1]["inline_data"]["data"], "a29tYQ==");
    }

    #[test]
    fn endpoint_includes_model() {
        let b = HostedBackend::new(
            reqwest::Client::new(),
            "https://example.test/".into(),
            "gemini-1.5-flash".into(),
        );
        assert_eq!(
            b.endpoint(),
            "https://example.test/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn response_text_joins_parts() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.into_text().as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn empty_candidates_have_no_text() {
        let parsed: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.into_text().is_none());
    }

    #[tokio::test]
    async fn missing_credential_is_rejected_before_sending() {
        let b = HostedBackend::new(reqwest::Client::new(), "http://127.0.0.1:9".into(), "m".into());
        let err = b.complete(&JudgeRequest::text("x"), None).await.unwrap_err();
        assert_eq!(err, BackendError::MissingCredential);
    }
}
