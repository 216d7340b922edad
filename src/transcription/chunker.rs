//! Chunk planning for oversized uploads.
//!
//! The speech service rejects audio units above [`MAX_AUDIO_BYTES`], so
//! larger files are split into consecutive slices. Slice durations are
//! derived from the source's bytes-per-millisecond ratio; when a slice still
//! exports oversized (variable-bitrate sources compress unpredictably), its
//! duration is halved and re-exported until it fits or the floor is hit.
//! Halving bounds the export/check round trips to O(log2(initial/floor)) per
//! oversized slice.

use std::path::Path;

use log::{debug, warn};
use tempfile::TempPath;

use super::{AudioSlicer, MAX_AUDIO_BYTES, MIN_CHUNK_DURATION_MS};
use crate::error::ApiError;

/// Floor on the bytes-per-millisecond ratio, guarding the candidate
/// derivation against pathological size/duration combinations.
const MIN_BYTES_PER_MS: f64 = 1e-6;

/// One accepted slice of the source, exported under the size ceiling.
///
/// The export lives in a temp file that is deleted when the chunk is
/// dropped, whether or not its transcription succeeded.
#[derive(Debug)]
pub struct ExportedChunk {
    path: TempPath,
    /// Slice start within the source, in milliseconds.
    pub start_ms: u64,
    /// Slice end within the source, in milliseconds.
    pub end_ms: u64,
}

impl ExportedChunk {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset added to every timestamp this chunk yields.
    pub fn offset_seconds(&self) -> f64 {
        self.start_ms as f64 / 1000.0
    }
}

/// Pull-based chunk planner: call [`ChunkPlanner::next_chunk`] until `None`.
///
/// Accepted chunks tile `[0, duration)` in order with no gaps or overlaps.
/// The cursor advances to each accepted slice's end, which for the final
/// slice is the source end rather than a full candidate length.
pub struct ChunkPlanner<'a> {
    slicer: &'a dyn AudioSlicer,
    source: &'a Path,
    duration_ms: u64,
    max_chunk_ms: u64,
    cursor_ms: u64,
}

impl std::fmt::Debug for ChunkPlanner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPlanner")
            .field("source", &self.source)
            .field("duration_ms", &self.duration_ms)
            .field("max_chunk_ms", &self.max_chunk_ms)
            .field("cursor_ms", &self.cursor_ms)
            .finish_non_exhaustive()
    }
}

impl<'a> ChunkPlanner<'a> {
    /// Probe the source and derive the initial candidate chunk duration.
    ///
    /// Fails with a decode error when the duration cannot be determined or
    /// is zero; chunking a file we cannot time would produce garbage spans.
    pub async fn plan(
        slicer: &'a dyn AudioSlicer,
        source: &'a Path,
        file_size: u64,
    ) -> Result<ChunkPlanner<'a>, ApiError> {
        let duration_ms = slicer.duration_ms(source).await?;
        if duration_ms == 0 {
            return Err(ApiError::Decode("uploaded audio has zero duration".to_string()));
        }

        let bytes_per_ms = (file_size as f64 / duration_ms as f64).max(MIN_BYTES_PER_MS);
        let max_chunk_ms =
            ((MAX_AUDIO_BYTES as f64 / bytes_per_ms) as u64).max(MIN_CHUNK_DURATION_MS);
        debug!(
            "chunk plan: {} bytes over {} ms, initial candidate {} ms",
            file_size, duration_ms, max_chunk_ms
        );

        Ok(Self {
            slicer,
            source,
            duration_ms,
            max_chunk_ms,
            cursor_ms: 0,
        })
    }

    /// Export and return the next compliant chunk, or `None` at end of source.
    ///
    /// Oversized exports are discarded and retried at half the duration;
    /// reaching the floor while still oversized is fatal for the request.
    pub async fn next_chunk(&mut self) -> Result<Option<ExportedChunk>, ApiError> {
        while self.cursor_ms < self.duration_ms {
            let remaining = self.duration_ms - self.cursor_ms;
            let mut candidate_ms = self
                .max_chunk_ms
                .min(remaining)
                .max(MIN_CHUNK_DURATION_MS);

            loop {
                let end_ms = self.duration_ms.min(self.cursor_ms + candidate_ms);
                if end_ms <= self.cursor_ms {
                    // Degenerate slice: nothing left worth exporting.
                    self.cursor_ms = self.duration_ms;
                    break;
                }

                let dest = tempfile::Builder::new()
                    .prefix("chunk-")
                    .suffix(".mp3")
                    .tempfile()?
                    .into_temp_path();
                let size = self
                    .slicer
                    .export_slice(self.source, self.cursor_ms, end_ms, &dest)
                    .await?;

                if size <= MAX_AUDIO_BYTES {
                    debug!(
                        "accepted chunk [{}, {}) ms at {} bytes",
                        self.cursor_ms, end_ms, size
                    );
                    let chunk = ExportedChunk {
                        path: dest,
                        start_ms: self.cursor_ms,
                        end_ms,
                    };
                    self.cursor_ms = end_ms;
                    return Ok(Some(chunk));
                }

                // Discard the oversized export before retrying shorter.
                drop(dest);
                if candidate_ms <= MIN_CHUNK_DURATION_MS {
                    return Err(ApiError::ChunkTooLarge);
                }
                candidate_ms = (candidate_ms / 2).max(MIN_CHUNK_DURATION_MS);
                warn!(
                    "chunk export at [{}, {}) ms was {} bytes over the ceiling, halving to {} ms",
                    self.cursor_ms,
                    end_ms,
                    size - MAX_AUDIO_BYTES,
                    candidate_ms
                );
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fake slicer with a fixed duration and a scripted export-size
    /// function; records every attempted export.
    struct ScriptedSlicer {
        total_ms: u64,
        cost: Box<dyn Fn(u64, u64) -> u64 + Send + Sync>,
        exports: Mutex<Vec<(u64, u64)>>,
    }

    impl ScriptedSlicer {
        fn new(total_ms: u64, cost: impl Fn(u64, u64) -> u64 + Send + Sync + 'static) -> Self {
            Self {
                total_ms,
                cost: Box::new(cost),
                exports: Mutex::new(Vec::new()),
            }
        }

        fn exports(&self) -> Vec<(u64, u64)> {
            self.exports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AudioSlicer for ScriptedSlicer {
        async fn duration_ms(&self, _src: &Path) -> Result<u64, ApiError> {
            Ok(self.total_ms)
        }

        async fn export_slice(
            &self,
            _src: &Path,
            start_ms: u64,
            end_ms: u64,
            _dest: &Path,
        ) -> Result<u64, ApiError> {
            self.exports.lock().unwrap().push((start_ms, end_ms));
            Ok((self.cost)(start_ms, end_ms))
        }
    }

    async fn collect_spans(planner: &mut ChunkPlanner<'_>) -> Vec<(u64, u64)> {
        let mut spans = Vec::new();
        while let Some(chunk) = planner.next_chunk().await.unwrap() {
            spans.push((chunk.start_ms, chunk.end_ms));
        }
        spans
    }

    #[tokio::test]
    async fn test_spans_tile_source_exactly() {
        // 60 MiB over 300 s: candidate lands around 125 s per chunk, every
        // export fits on the first attempt.
        let slicer = ScriptedSlicer::new(300_000, |start, end| (end - start) * 16);
        let source = Path::new("fake.mp3");
        let mut planner = ChunkPlanner::plan(&slicer, source, 60 * 1024 * 1024)
            .await
            .unwrap();

        let spans = collect_spans(&mut planner).await;
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].0, 0);
        assert_eq!(spans.last().unwrap().1, 300_000);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].1, pair[1].0, "gap or overlap between {:?}", pair);
        }
        // First chunk approximates ceiling / bytes-per-ms.
        assert!((124_900..=125_100).contains(&spans[0].1), "got {}", spans[0].1);
    }

    #[tokio::test]
    async fn test_barely_oversized_source_splits_in_two() {
        // 30 MiB over 60 s: the candidate covers five sixths of the source,
        // leaving a short second chunk for the rest.
        let slicer = ScriptedSlicer::new(60_000, |_, _| 1_000);
        let source = Path::new("fake.mp3");
        let mut planner = ChunkPlanner::plan(&slicer, source, 30 * 1024 * 1024)
            .await
            .unwrap();

        let spans = collect_spans(&mut planner).await;
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].0, 0);
        assert_eq!(spans[0].1, spans[1].0);
        assert_eq!(spans[1].1, 60_000);
        assert!((49_900..=50_100).contains(&spans[0].1), "got {}", spans[0].1);
    }

    #[tokio::test]
    async fn test_halving_until_export_fits() {
        // Initial candidate is 8 s (file is 1.25x the ceiling over 10 s);
        // only slices of 1 s or less export under the ceiling, so acceptance
        // takes three halvings down to one eighth of the candidate.
        let file_size = MAX_AUDIO_BYTES + MAX_AUDIO_BYTES / 4;
        let slicer = ScriptedSlicer::new(10_000, |start, end| {
            if end - start <= 1_000 {
                1_000
            } else {
                MAX_AUDIO_BYTES + 1
            }
        });
        let source = Path::new("fake.mp3");
        let mut planner = ChunkPlanner::plan(&slicer, source, file_size).await.unwrap();

        let first = planner.next_chunk().await.unwrap().unwrap();
        assert_eq!((first.start_ms, first.end_ms), (0, 1_000));
        assert_eq!(
            slicer.exports(),
            vec![(0, 8_000), (0, 4_000), (0, 2_000), (0, 1_000)],
            "expected three halvings before acceptance"
        );

        // The next accepted span starts exactly where the previous ended.
        let second = planner.next_chunk().await.unwrap().unwrap();
        assert_eq!(second.start_ms, first.end_ms);
    }

    #[tokio::test]
    async fn test_unsplittable_source_is_fatal() {
        let file_size = 2 * MAX_AUDIO_BYTES;
        let slicer = ScriptedSlicer::new(8_000, |_, _| MAX_AUDIO_BYTES + 1);
        let source = Path::new("fake.mp3");
        let mut planner = ChunkPlanner::plan(&slicer, source, file_size).await.unwrap();

        let err = planner.next_chunk().await.unwrap_err();
        assert!(matches!(err, ApiError::ChunkTooLarge));
        // Halved down to the floor, tried once there, then gave up.
        assert_eq!(
            slicer.exports(),
            vec![(0, 4_000), (0, 2_000), (0, 1_000)]
        );
    }

    #[tokio::test]
    async fn test_short_tail_is_clamped_to_source_end() {
        // 5.5 s source with a 1 s candidate: last span is the 500 ms tail.
        let file_size = 50 * MAX_AUDIO_BYTES;
        let slicer = ScriptedSlicer::new(5_500, |_, _| 1_000);
        let source = Path::new("fake.mp3");
        let mut planner = ChunkPlanner::plan(&slicer, source, file_size).await.unwrap();

        let spans = collect_spans(&mut planner).await;
        assert_eq!(
            spans,
            vec![(0, 1_000), (1_000, 2_000), (2_000, 3_000), (3_000, 4_000), (4_000, 5_000), (5_000, 5_500)]
        );
    }

    #[tokio::test]
    async fn test_zero_duration_is_a_decode_error() {
        let slicer = ScriptedSlicer::new(0, |_, _| 1_000);
        let source = Path::new("fake.mp3");
        let err = ChunkPlanner::plan(&slicer, source, 2 * MAX_AUDIO_BYTES)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
