//! OpenAI speech translation backend.
//!
//! Posts audio files to the `audio/translations` endpoint and parses the
//! `verbose_json` response into a [`TranslationOutcome`].

use std::path::Path;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use super::{TranslationBackend, TranslationOutcome};
use crate::config::Settings;
use crate::error::ApiError;

pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            api_key: settings.openai_api_key.clone(),
            base_url: normalize_base_url(&settings.openai_base_url),
            model: settings.openai_model.clone(),
        }
    }
}

/// Strip a trailing `/models` (some proxies hand out the models URL) and any
/// trailing slash so endpoint paths can be appended directly.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    let url = url.strip_suffix("/models").unwrap_or(url);
    url.to_string()
}

#[async_trait]
impl TranslationBackend for OpenAiBackend {
    async fn translate(&self, path: &Path) -> Result<TranslationOutcome, ApiError> {
        let audio = tokio::fs::read(path).await?;
        debug!("sending {} byte audio unit to {}", audio.len(), self.base_url);

        let part = Part::bytes(audio)
            .file_name("audio.mp3")
            .mime_str("audio/mpeg")
            .map_err(|e| ApiError::Service(format!("invalid multipart payload: {e}")))?;

        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let url = format!("{}/audio/translations", self.base_url);
        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ApiError::Service(format!("failed to send request: {e}")))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Service(format!("API error {status}: {body}")));
        }

        let outcome: TranslationOutcome = res
            .json()
            .await
            .map_err(|e| ApiError::Service(format!("malformed response: {e}")))?;

        info!(
            "translation returned {} segments, {} chars of flat text",
            outcome.segments.len(),
            outcome.text.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1"
        );
        assert_eq!(
            normalize_base_url("https://proxy.example/v1/models"),
            "https://proxy.example/v1"
        );
    }

    #[test]
    fn test_outcome_fields_default_when_absent() {
        let outcome: TranslationOutcome = serde_json::from_str("{}").unwrap();
        assert!(outcome.text.is_empty());
        assert!(outcome.segments.is_empty());

        let outcome: TranslationOutcome =
            serde_json::from_str(r#"{"text":"hi","segments":[{"text":"hi"}]}"#).unwrap();
        assert_eq!(outcome.segments[0].start, 0.0);
        assert_eq!(outcome.segments[0].end, 0.0);
        assert_eq!(outcome.segments[0].text, "hi");
    }
}
