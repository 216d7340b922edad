//! Backend abstraction over the remote speech translation capability.
//!
//! The pipeline depends on the [`TranslationBackend`] trait instead of a
//! concrete client, which keeps chunk planning and SRT assembly decoupled
//! from wire code and testable with scripted fakes.

pub mod openai;

pub use openai::OpenAiBackend;

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ApiError;

/// One timed record as the speech service reports it.
///
/// Every field is defaulted: the service omits timing on some responses and
/// the pipeline treats missing values as zero or empty rather than failing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSegment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

/// Result of one translation call: flat transcript text plus whatever timed
/// segments the service chose to return. Consumed immediately by the
/// pipeline, never persisted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranslationOutcome {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<RawSegment>,
}

/// Remote capability: audio file in, English transcript out.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Translate the audio file at `path` to English.
    ///
    /// The file must be at or below [`crate::transcription::MAX_AUDIO_BYTES`];
    /// chunking oversized sources is the caller's job. Transport and service
    /// failures map to [`ApiError::Service`], never to silently empty output.
    async fn translate(&self, path: &Path) -> Result<TranslationOutcome, ApiError>;
}
