//! SubRip (SRT) rendering for transcription segments.
//!
//! Two render paths share the same block formatting: [`segments_to_srt`]
//! produces the whole document at once, and [`srt_block_stream`] emits it
//! incrementally so HTTP callers can flush subtitles while later chunks are
//! still being transcribed. Concatenating the stream's chunks reproduces the
//! whole-document output byte for byte.

use async_stream::try_stream;
use bytes::Bytes;
use futures_util::Stream;

use crate::error::ApiError;
use crate::transcription::Segment;

/// Minimum rendered duration for degenerate or synthesized timing.
const MIN_SEGMENT_DURATION: f64 = 0.5;

/// Reading-speed guess used when the service returns no timing data.
const SECONDS_PER_WORD: f64 = 0.4;

/// Format seconds as an SRT `HH:MM:SS,mmm` timestamp.
///
/// Negative input clamps to zero and values round to the nearest
/// millisecond. Hours are not wrapped, so inputs past a day render with
/// hour counts above 23.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = total_ms % 3_600_000 / 60_000;
    let secs = total_ms % 60_000 / 1_000;
    let millis = total_ms % 1_000;
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

/// Render one three-line SRT block: index, time range, caption text.
///
/// Degenerate timing (`end <= start`) is repaired to the minimum duration
/// before formatting.
pub fn render_block(index: usize, segment: &Segment) -> String {
    let start = segment.start;
    let end = if segment.end <= start {
        start + MIN_SEGMENT_DURATION
    } else {
        segment.end
    };
    format!(
        "{index}\n{} --> {}\n{}",
        format_timestamp(start),
        format_timestamp(end),
        segment.text.trim()
    )
}

/// Render a whole segment list as SRT text.
///
/// Blocks are blank-line separated with exactly one trailing newline. An
/// empty list, or one with only blank texts, renders as the empty string.
/// Indices are positional over the rendered blocks, starting at 1.
pub fn segments_to_srt(segments: &[Segment]) -> String {
    let mut out = String::new();
    let mut index = 0usize;
    for segment in segments {
        if segment.text.trim().is_empty() {
            continue;
        }
        index += 1;
        if index > 1 {
            out.push_str("\n\n");
        }
        out.push_str(&render_block(index, segment));
    }
    if index > 0 {
        out.push('\n');
    }
    out
}

/// Incremental SRT rendering over a fallible segment stream.
///
/// Each yielded chunk can be appended verbatim by the client: the first
/// block is bare, every later block carries its blank-line separator in the
/// same chunk, and a single trailing-newline chunk follows the last block.
/// An empty input stream yields nothing. The stream is consumed once and is
/// not restartable; an upstream error ends it after whatever was yielded.
pub fn srt_block_stream<S>(segments: S) -> impl Stream<Item = Result<Bytes, ApiError>>
where
    S: Stream<Item = Result<Segment, ApiError>>,
{
    try_stream! {
        let mut index = 0usize;
        for await segment in segments {
            let segment = segment?;
            if segment.text.trim().is_empty() {
                continue;
            }
            index += 1;
            let block = render_block(index, &segment);
            if index == 1 {
                yield Bytes::from(block);
            } else {
                yield Bytes::from(format!("\n\n{block}"));
            }
        }
        if index > 0 {
            yield Bytes::from_static(b"\n");
        }
    }
}

/// Synthesize a single segment from flat transcript text.
///
/// Used when the service returns no timed segments at all. Duration is the
/// reading-speed guess, floored at the minimum segment duration. Blank text
/// synthesizes nothing.
pub fn fallback_segment(text: &str) -> Option<Segment> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return None;
    }
    let words = cleaned.split_whitespace().count();
    let duration = (words as f64 * SECONDS_PER_WORD).max(MIN_SEGMENT_DURATION);
    Some(Segment {
        start: 0.0,
        end: duration,
        text: cleaned.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn seg(start: f64, end: f64, text: &str) -> Segment {
        Segment {
            start,
            end,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_timestamp(3661.2005), "01:01:01,200");
        assert_eq!(format_timestamp(-5.0), "00:00:00,000");
        assert_eq!(format_timestamp(59.9996), "00:01:00,000");
        // No day rollover: hours just keep counting.
        assert_eq!(format_timestamp(90_000.0), "25:00:00,000");
    }

    #[test]
    fn test_render_block_repairs_degenerate_timing() {
        let block = render_block(3, &seg(10.0, 10.0, "hello"));
        assert_eq!(block, "3\n00:00:10,000 --> 00:00:10,500\nhello");

        let block = render_block(1, &seg(4.0, 2.0, "backwards"));
        assert_eq!(block, "1\n00:00:04,000 --> 00:00:04,500\nbackwards");
    }

    #[test]
    fn test_segments_to_srt() {
        let srt = segments_to_srt(&[seg(0.0, 1.5, "first line"), seg(1.5, 3.0, "second line")]);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,500\nfirst line\n\n\
             2\n00:00:01,500 --> 00:00:03,000\nsecond line\n"
        );
    }

    #[test]
    fn test_empty_input_renders_empty_string() {
        assert_eq!(segments_to_srt(&[]), "");
        assert_eq!(segments_to_srt(&[seg(0.0, 1.0, "   ")]), "");
    }

    #[test]
    fn test_indices_are_positional_over_rendered_blocks() {
        let srt = segments_to_srt(&[
            seg(0.0, 1.0, "a"),
            seg(1.0, 2.0, " "),
            seg(2.0, 3.0, "b"),
        ]);
        assert!(srt.starts_with("1\n"));
        assert!(srt.contains("\n\n2\n"), "blank segment must not consume an index: {srt}");
    }

    #[test]
    fn test_fallback_segment() {
        let segment = fallback_segment("hello world").unwrap();
        assert_eq!(segment.start, 0.0);
        assert!((segment.end - 0.8).abs() < 1e-9);
        assert_eq!(segment.text, "hello world");

        // Single short word still gets the minimum duration.
        assert!((fallback_segment("hi").unwrap().end - 0.5).abs() < 1e-9);
        assert!(fallback_segment("   ").is_none());
        assert!(fallback_segment("").is_none());
    }

    #[tokio::test]
    async fn test_stream_concatenates_to_whole_output() {
        let segments = vec![
            seg(0.0, 1.5, "first line"),
            seg(1.5, 3.0, "second line"),
            seg(3.0, 3.0, "degenerate"),
        ];
        let whole = segments_to_srt(&segments);

        let input = futures_util::stream::iter(segments.into_iter().map(Ok));
        let chunks: Vec<_> = srt_block_stream(input).collect().await;
        let streamed: String = chunks
            .into_iter()
            .map(|chunk| String::from_utf8(chunk.unwrap().to_vec()).unwrap())
            .collect();

        assert_eq!(streamed, whole);
    }

    #[tokio::test]
    async fn test_stream_of_nothing_yields_nothing() {
        let input = futures_util::stream::iter(Vec::<Result<Segment, ApiError>>::new());
        let chunks: Vec<_> = srt_block_stream(input).collect().await;
        assert!(chunks.is_empty());
    }
}
