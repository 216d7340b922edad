//! Subtitle generation service: media uploads in, SRT text out.
//!
//! Uploaded audio/video is normalized to mono 16 kHz MP3 with ffmpeg, split
//! into size-compliant chunks when the speech service's upload ceiling
//! requires it, translated to English through an OpenAI-compatible API, and
//! rendered as SubRip subtitles — returned whole or streamed block by block.

pub mod config;
pub mod error;
pub mod server;
pub mod srt;
pub mod transcription;
