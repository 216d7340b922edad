//! Chunked transcription pipeline.
//!
//! This module turns a normalized audio file into an ordered stream of timed
//! English segments by way of a remote speech API. It handles:
//! - size-ceiling chunk planning with halving backoff
//! - per-chunk slice export through ffmpeg
//! - remote translation calls per chunk
//! - timestamp offsetting and reassembly into one ordered stream

pub mod backends;
mod chunker;
mod ffmpeg;
mod pipeline;

pub use backends::{OpenAiBackend, RawSegment, TranslationBackend, TranslationOutcome};
pub use chunker::{ChunkPlanner, ExportedChunk};
pub use ffmpeg::{AudioSlicer, FfmpegTool};
pub use pipeline::{normalize_segments, segment_stream};

/// A timed span of recognized speech, offset into the original source.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Start time in seconds from the beginning of the uploaded media.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Transcribed text, trimmed and non-empty.
    pub text: String,
}

/// Byte ceiling the speech service accepts per uploaded audio unit.
pub const MAX_AUDIO_BYTES: u64 = 25 * 1024 * 1024;

/// Lower bound on chunk duration when splitting oversized audio.
pub const MIN_CHUNK_DURATION_MS: u64 = 1_000;

/// Bitrate for normalized audio and chunk slice exports.
pub const CHUNK_EXPORT_BITRATE: &str = "128k";

/// Sample rate all uploads are normalized to before transcription.
pub const NORMALIZED_SAMPLE_RATE: u32 = 16_000;
