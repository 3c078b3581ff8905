//! Image classification through the Gemini `generateContent` API

use std::{path::Path, time::Duration};

use anyhow::Context;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::{ClassifierConfig, credential};

pub const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROMPT: &str = "Analyze the image and identify the primary subject.
- If it is a music artist, respond with: Artist: [Name]
- If it is a religious figure (like a god, prophet, or spiritual leader), respond with: Figure: [Name]
- If it is neither, respond with the exact phrase: 'No match'.
Respond with only one of these formats.";

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("image model API key not found, set {0} in the environment or .env file")]
    MissingCredential(String),

    #[error("image model request failed: {0}")]
    Request(String),

    #[error("image model returned no text")]
    EmptyResponse,
}

/// Raw uploaded image
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read image {}", path.to_string_lossy()))?;
        let mime_type = mime_guess::from_path(path)
            .first_or(mime_guess::mime::IMAGE_JPEG)
            .to_string();
        Ok(Self { bytes, mime_type })
    }
}

/// Black-box image model.
///
/// Answers with free text that is expected to be `Artist: <name>`,
/// `Figure: <name>` or `No match`; interpreting it is up to the caller.
pub trait EntityClassifier {
    fn describe(&self, image: &ImageUpload) -> Result<String, ClassifyError>;
}

pub struct GeminiClassifier {
    http_client: ureq::Agent,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    endpoint: String,
}

impl GeminiClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(60))
            .timeout_write(Duration::from_secs(30))
            .build();
        Self {
            http_client,
            api_key: credential(&config.api_key_env),
            api_key_env: config.api_key_env.clone(),
            model: config.model.clone(),
            endpoint: GEMINI_ENDPOINT.to_string(),
        }
    }

    fn request_body(image: &ImageUpload) -> Value {
        json!({
            "contents": [{
                "parts": [
                    { "text": PROMPT },
                    {
                        "inline_data": {
                            "mime_type": image.mime_type,
                            "data": STANDARD.encode(&image.bytes),
                        }
                    }
                ]
            }]
        })
    }
}

/// concatenated text parts of the first candidate
fn reply_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<String>();

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

impl EntityClassifier for GeminiClassifier {
    fn describe(&self, image: &ImageUpload) -> Result<String, ClassifyError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ClassifyError::MissingCredential(self.api_key_env.clone()))?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );
        log::info!(
            "classifying {} byte {} image with {}",
            image.bytes.len(),
            image.mime_type,
            self.model
        );

        let response = self
            .http_client
            .post(&url)
            .query("key", api_key)
            .send_json(Self::request_body(image))
            .map_err(|e| match e {
                ureq::Error::Status(status, response) => ClassifyError::Request(format!(
                    "HTTP {status}: {}",
                    response.into_string().unwrap_or_default()
                )),
                ureq::Error::Transport(transport) => ClassifyError::Request(transport.to_string()),
            })?;

        let body: Value = response
            .into_json()
            .map_err(|e| ClassifyError::Request(format!("invalid response: {e}")))?;

        let text = reply_text(&body).ok_or(ClassifyError::EmptyResponse)?;
        log::debug!("image model replied: {}", text.trim());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_request_body_inlines_image() {
        let body = GeminiClassifier::request_body(&ImageUpload::new(b"abc".to_vec(), "image/png"));

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], PROMPT);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "YWJj");
    }

    #[test]
    fn test_reply_text_joins_parts() {
        let response = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Artist: "}, {"text": "Test Singer"}]}
            }]
        });

        assert_eq!(reply_text(&response).as_deref(), Some("Artist: Test Singer"));
    }

    #[test]
    fn test_reply_text_missing_or_blank() {
        assert_eq!(reply_text(&json!({"candidates": []})), None);
        assert_eq!(
            reply_text(&json!({"candidates": [{"content": {"parts": [{"text": "  "}]}}]})),
            None
        );
        assert_eq!(reply_text(&json!({"promptFeedback": {"blockReason": "SAFETY"}})), None);
    }

    #[test]
    fn test_missing_credential() {
        let classifier = GeminiClassifier {
            api_key: None,
            ..GeminiClassifier::new(&ClassifierConfig {
                api_key_env: "SNAPTRACK_TEST_NO_SUCH_KEY".into(),
                model: "m".into(),
            })
        };

        let result = classifier.describe(&ImageUpload::new(vec![1, 2, 3], "image/jpeg"));

        assert!(matches!(result, Err(ClassifyError::MissingCredential(name)) if name == "SNAPTRACK_TEST_NO_SUCH_KEY"));
    }

    #[test]
    fn test_image_mime_from_extension() -> anyhow::Result<()> {
        let tmp = tempdir()?;
        let png = tmp.path().join("photo.png");
        let unknown = tmp.path().join("photo");
        std::fs::write(&png, b"png")?;
        std::fs::write(&unknown, b"???")?;

        assert_eq!(ImageUpload::from_path(&png)?.mime_type, "image/png");
        assert_eq!(ImageUpload::from_path(&unknown)?.mime_type, "image/jpeg");
        assert!(ImageUpload::from_path(&PathBuf::from("/no/such/photo.jpg")).is_err());
        Ok(())
    }
}
