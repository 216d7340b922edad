//! Transcription orchestration: one lazily-produced, ordered segment stream.
//!
//! Files under the service ceiling go out in a single call; oversized files
//! are driven through the chunk planner, with each chunk's timestamps
//! shifted by its offset into the source. Nothing past the current chunk is
//! exported or transcribed until the consumer pulls, so streaming callers
//! start receiving subtitles while later chunks are still in flight and
//! peak state stays at one chunk.

use std::path::PathBuf;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::Stream;
use log::{debug, info};

use super::backends::{RawSegment, TranslationBackend};
use super::chunker::ChunkPlanner;
use super::{AudioSlicer, Segment, MAX_AUDIO_BYTES};
use crate::error::ApiError;
use crate::srt::fallback_segment;

/// Convert raw service records into [`Segment`]s shifted by `offset_seconds`.
///
/// Text is trimmed and records left empty are dropped. A missing or
/// backwards `end` falls back to the record's `start`; rendering repairs the
/// resulting zero duration. Input order is preserved.
pub fn normalize_segments(raw: &[RawSegment], offset_seconds: f64) -> Vec<Segment> {
    raw.iter()
        .filter_map(|record| {
            let text = record.text.trim();
            if text.is_empty() {
                return None;
            }
            Some(Segment {
                start: record.start + offset_seconds,
                end: record.end.max(record.start) + offset_seconds,
                text: text.to_string(),
            })
        })
        .collect()
}

fn shift(segment: Segment, offset_seconds: f64) -> Segment {
    Segment {
        start: segment.start + offset_seconds,
        end: segment.end + offset_seconds,
        text: segment.text,
    }
}

/// Segments for one translation call: normalized timed records, or a single
/// synthesized fallback from the call's flat text when none survive.
fn call_segments(raw: &[RawSegment], text: &str, offset_seconds: f64) -> Vec<Segment> {
    let segments = normalize_segments(raw, offset_seconds);
    if !segments.is_empty() {
        return segments;
    }
    fallback_segment(text)
        .map(|segment| shift(segment, offset_seconds))
        .into_iter()
        .collect()
}

/// Lazily transcribe `audio` into ordered, globally-offset segments.
///
/// `file_size` is the on-disk size of `audio`, measured after normalization
/// and trimming; it decides single-shot versus chunked processing. The
/// stream ends when the source is fully consumed, or terminates with the
/// first error — segments already yielded to a streaming consumer remain
/// valid and delivered.
pub fn segment_stream(
    backend: Arc<dyn TranslationBackend>,
    slicer: Arc<dyn AudioSlicer>,
    audio: PathBuf,
    file_size: u64,
) -> impl Stream<Item = Result<Segment, ApiError>> + Send {
    try_stream! {
        if file_size <= MAX_AUDIO_BYTES {
            debug!("{file_size} bytes fits the service ceiling, transcribing in one call");
            let outcome = backend.translate(&audio).await?;
            for segment in call_segments(&outcome.segments, &outcome.text, 0.0) {
                yield segment;
            }
        } else {
            debug!("{file_size} bytes exceeds the service ceiling, chunking");
            let mut planner = ChunkPlanner::plan(slicer.as_ref(), &audio, file_size).await?;
            let mut emitted = false;
            let mut collected_text: Vec<String> = Vec::new();

            while let Some(chunk) = planner.next_chunk().await? {
                let offset = chunk.offset_seconds();
                let outcome = backend.translate(chunk.path()).await?;
                // The export has served its purpose; delete it before the
                // consumer stalls us on the next pull.
                drop(chunk);

                let trimmed = outcome.text.trim();
                if !trimmed.is_empty() {
                    collected_text.push(trimmed.to_string());
                }

                for segment in call_segments(&outcome.segments, &outcome.text, offset) {
                    emitted = true;
                    yield segment;
                }
            }

            if !emitted {
                info!("no timed segments from any chunk, falling back to flat transcript text");
                for segment in fallback_segment(&collected_text.join(" ")) {
                    yield segment;
                }
            }
        }
    }
}
