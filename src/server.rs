//! HTTP surface: upload handling, validation, and SRT responses.
//!
//! The routes are thin glue over the transcription pipeline. The one piece
//! of real logic here is resource lifetime: every intermediate file of a
//! request is a `TempPath` whose drop deletes it, and for streaming
//! responses the normalized audio is moved into the response stream so a
//! client abort tears the whole pipeline down, files included.

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use log::info;
use serde::Deserialize;
use serde_json::json;
use tempfile::TempPath;

use crate::error::ApiError;
use crate::srt::{segments_to_srt, srt_block_stream};
use crate::transcription::{
    segment_stream, AudioSlicer, FfmpegTool, Segment, TranslationBackend,
};

/// Upper bound on accepted upload bodies (1 GiB). Deliberately far above the
/// speech service ceiling, since oversized sources are chunked locally.
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

const UPLOAD_PAGE_HTML: &str = include_str!("../assets/upload.html");

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn TranslationBackend>,
    pub ffmpeg: Arc<FfmpegTool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ui", get(upload_interface))
        .route("/healthz", get(healthcheck))
        .route("/generate-subtitles", post(generate_subtitles))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Upload an audio or video file to /generate-subtitles" }))
}

async fn upload_interface() -> Html<&'static str> {
    Html(UPLOAD_PAGE_HTML)
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct GenerateParams {
    /// Limit transcription to the first N minutes of audio.
    max_duration_minutes: Option<u32>,
    /// Stream subtitle output as it is generated.
    #[serde(default)]
    stream: bool,
}

async fn generate_subtitles(
    State(state): State<AppState>,
    Query(params): Query<GenerateParams>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    if let Some(minutes) = params.max_duration_minutes {
        if !(1..=240).contains(&minutes) {
            return Err(ApiError::InvalidInput(
                "max_duration_minutes must be between 1 and 240".to_string(),
            ));
        }
    }

    let upload = read_upload(multipart).await?;
    let safe_name = safe_base_name(&upload.file_name);
    info!(
        "accepted upload \"{}\" ({} bytes, stream={})",
        upload.file_name,
        upload.data.len(),
        params.stream
    );

    let spooled = spool_upload(&upload).await?;
    let normalized = new_scratch_file("normalized-")?;
    state.ffmpeg.normalize(&spooled, &normalized).await?;
    drop(spooled);

    let audio = match params.max_duration_minutes {
        Some(minutes) => {
            trim_to_cap(&state.ffmpeg, normalized, u64::from(minutes) * 60_000).await?
        }
        None => normalized,
    };

    let file_size = tokio::fs::metadata(&audio).await?.len();
    let segments = hold_until_done(
        segment_stream(
            state.backend.clone(),
            state.ffmpeg.clone() as Arc<dyn AudioSlicer>,
            audio.to_path_buf(),
            file_size,
        ),
        audio,
    );

    let headers = [
        (header::CONTENT_TYPE, "application/x-subrip".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{safe_name}.srt\""),
        ),
    ];

    if params.stream {
        let mut segments = Box::pin(segments);
        // Pull the first segment before committing to a 200, so an empty or
        // failed transcription still gets a proper error status.
        let first = match segments.next().await {
            None => return Err(ApiError::NoTranscript),
            Some(Err(e)) => return Err(e),
            Some(Ok(segment)) => segment,
        };
        info!("streaming SRT response for \"{safe_name}\"");
        let replayed = futures_util::stream::iter([Ok::<Segment, ApiError>(first)]).chain(segments);
        let body = Body::from_stream(srt_block_stream(replayed));
        return Ok((headers, body).into_response());
    }

    let mut segments = Box::pin(segments);
    let mut collected: Vec<Segment> = Vec::new();
    while let Some(item) = segments.next().await {
        collected.push(item?);
    }
    if collected.is_empty() {
        return Err(ApiError::NoTranscript);
    }

    let srt = segments_to_srt(&collected);
    if srt.is_empty() {
        return Err(ApiError::NoTranscript);
    }
    info!(
        "rendered {} subtitle blocks for \"{safe_name}\"",
        collected.len()
    );
    Ok((headers, srt).into_response())
}

struct Upload {
    file_name: String,
    data: Bytes,
}

/// Pull the `file` field out of the multipart body, validating as we go.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.is_empty() {
            return Err(ApiError::InvalidInput(
                "upload must include a filename".to_string(),
            ));
        }
        if let Some(content_type) = field.content_type() {
            if !is_supported_content_type(content_type) {
                return Err(ApiError::InvalidInput(
                    "only audio or video uploads are supported".to_string(),
                ));
            }
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidInput(format!("failed to read upload: {e}")))?;
        if data.is_empty() {
            return Err(ApiError::InvalidInput("uploaded file is empty".to_string()));
        }
        return Ok(Upload { file_name, data });
    }

    Err(ApiError::InvalidInput(
        "multipart field \"file\" is required".to_string(),
    ))
}

fn is_supported_content_type(content_type: &str) -> bool {
    content_type.starts_with("audio/")
        || content_type.starts_with("video/")
        || content_type == "application/octet-stream"
}

/// Attachment base name: the upload's stem with header-hostile characters
/// removed, or a generic default.
fn safe_base_name(file_name: &str) -> String {
    let stem: String = Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    if stem.is_empty() {
        "transcription".to_string()
    } else {
        stem
    }
}

/// Write the upload to a scratch file, carrying the original extension so
/// ffmpeg's format probing has a hint to work with.
async fn spool_upload(upload: &Upload) -> Result<TempPath, ApiError> {
    let suffix = Path::new(&upload.file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| ".mp3".to_string());
    let spool = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&suffix)
        .tempfile()?
        .into_temp_path();
    tokio::fs::write(&spool, &upload.data).await?;
    Ok(spool)
}

fn new_scratch_file(prefix: &str) -> Result<TempPath, ApiError> {
    Ok(tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".mp3")
        .tempfile()?
        .into_temp_path())
}

/// Apply the duration cap, strictly before chunk planning.
///
/// Returns the file to feed the pipeline: the original when it already fits
/// the cap, otherwise a trimmed re-export (the original is deleted on drop).
async fn trim_to_cap(
    ffmpeg: &FfmpegTool,
    normalized: TempPath,
    limit_ms: u64,
) -> Result<TempPath, ApiError> {
    let duration_ms = ffmpeg.probe_duration_ms(&normalized).await?;
    if duration_ms <= limit_ms {
        return Ok(normalized);
    }

    let trimmed = new_scratch_file("trimmed-")?;
    ffmpeg
        .trim(&normalized, limit_ms, &trimmed)
        .await
        .map_err(|e| match e {
            ApiError::FfmpegFailed(diag) => {
                ApiError::InvalidInput(format!("unable to trim audio: {diag}"))
            }
            other => other,
        })?;
    Ok(trimmed)
}

/// Tie the normalized audio's lifetime to the segment stream, so the file
/// survives for as long as the response is being produced — and no longer.
fn hold_until_done<S>(
    inner: S,
    guard: TempPath,
) -> impl Stream<Item = Result<Segment, ApiError>> + Send
where
    S: Stream<Item = Result<Segment, ApiError>> + Send,
{
    async_stream::stream! {
        let _guard = guard;
        for await item in inner {
            yield item;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_content_types() {
        assert!(is_supported_content_type("audio/mpeg"));
        assert!(is_supported_content_type("video/mp4"));
        assert!(is_supported_content_type("application/octet-stream"));
        assert!(!is_supported_content_type("text/plain"));
        assert!(!is_supported_content_type("application/json"));
    }

    #[test]
    fn test_safe_base_name() {
        assert_eq!(safe_base_name("lecture.mp4"), "lecture");
        assert_eq!(safe_base_name("two.dots.mp3"), "two.dots");
        assert_eq!(safe_base_name("qu\"ote\\d.wav"), "quoted");
        assert_eq!(safe_base_name(""), "transcription");
    }
}
