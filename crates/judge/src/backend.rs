//! The backend strategy trait and the request it serves.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// What a request needs from a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Images plus a text prompt.
    Multimodal,
    /// Text prompt only.
    Text,
}

/// Position of a backend in the cost ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    LocalPreferred,
    LocalSecondary,
    Hosted,
}

/// One encoded image attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl JudgeImage {
    /// Read an image file, guessing its MIME type from the extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            _ => "image/png",
        };
        Ok(Self {
            mime_type: mime_type.to_string(),
            bytes,
        })
    }
}

/// A prompt and its attached images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeRequest {
    pub prompt: String,
    pub images: Vec<JudgeImage>,
}

impl JudgeRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
        }
    }

    pub fn multimodal(prompt: impl Into<String>, images: Vec<JudgeImage>) -> Self {
        Self {
            prompt: prompt.into(),
            images,
        }
    }

    pub fn capability(&self) -> Capability {
        if self.images.is_empty() {
            Capability::Text
        } else {
            Capability::Multimodal
        }
    }
}

/// One judge strategy in the gateway's chain.
#[async_trait]
pub trait JudgeBackend: Send + Sync {
    /// Stable name used in logs and provenance.
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    fn supports(&self, capability: Capability) -> bool;

    /// Whether calls need a credential from the hosted pool.
    fn requires_credential(&self) -> bool {
        false
    }

    /// Send the request and return the raw response text.
    async fn complete(
        &self,
        request: &JudgeRequest,
        credential: Option<&str>,
    ) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_follows_images() {
        assert_eq!(JudgeRequest::text("hi").capability(), Capability::Text);
        let img = JudgeImage {
            mime_type: "image/png".into(),
            bytes: vec![1, 2, 3],
        };
        assert_eq!(
            JudgeRequest::multimodal("hi", vec![img]).capability(),
            Capability::Multimodal
        );
    }

    #[test]
    fn mime_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.JPG");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let img = JudgeImage::from_path(&path).unwrap();
        assert_eq!(img.mime_type, "image/jpeg");
        assert_eq!(img.bytes, b"not really a jpeg");
    }
}
