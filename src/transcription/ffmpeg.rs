//! Audio normalization and slicing for transcription.
//!
//! The service never decodes audio itself; every conversion shells out to
//! `ffmpeg`/`ffprobe`. This module wraps those invocations and maps their
//! failure modes onto the request error taxonomy.

use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use super::{CHUNK_EXPORT_BITRATE, NORMALIZED_SAMPLE_RATE};
use crate::error::ApiError;

/// Slicing capability the chunk planner consumes.
///
/// Production code uses [`FfmpegTool`]; tests substitute scripted fakes to
/// exercise the planner without media files.
#[async_trait]
pub trait AudioSlicer: Send + Sync {
    /// Total decoded duration of `src` in milliseconds.
    async fn duration_ms(&self, src: &Path) -> Result<u64, ApiError>;

    /// Export `[start_ms, end_ms)` of `src` to `dest` as MP3 at the chunk
    /// bitrate and return the exported byte size.
    async fn export_slice(
        &self,
        src: &Path,
        start_ms: u64,
        end_ms: u64,
        dest: &Path,
    ) -> Result<u64, ApiError>;
}

/// Thin wrapper over the `ffmpeg`/`ffprobe` binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegTool;

impl FfmpegTool {
    pub fn new() -> Self {
        Self
    }

    /// Convert any media file into mono MP3 at the normalized sample rate.
    ///
    /// Video streams are dropped. A missing binary maps to
    /// [`ApiError::FfmpegMissing`]; a non-zero exit to
    /// [`ApiError::FfmpegFailed`] carrying the tool's diagnostics.
    pub async fn normalize(&self, src: &Path, dest: &Path) -> Result<(), ApiError> {
        debug!("normalizing {} -> {}", src.display(), dest.display());
        run_tool(
            Command::new("ffmpeg")
                .arg("-y")
                .arg("-i")
                .arg(src)
                .arg("-vn")
                .args(["-ac", "1"])
                .args(["-ar", &NORMALIZED_SAMPLE_RATE.to_string()])
                .args(["-c:a", "libmp3lame"])
                .args(["-b:a", CHUNK_EXPORT_BITRATE])
                .arg(dest),
        )
        .await?;
        Ok(())
    }

    /// Probe the decoded duration of `src` in milliseconds.
    ///
    /// Probe failures are decode errors: the file was accepted for upload
    /// but its content cannot be timed, which is the uploader's problem.
    pub async fn probe_duration_ms(&self, src: &Path) -> Result<u64, ApiError> {
        let output = run_tool(
            Command::new("ffprobe")
                .args(["-v", "error"])
                .args(["-show_entries", "format=duration"])
                .args(["-of", "default=noprint_wrappers=1:nokey=1"])
                .arg(src),
        )
        .await
        .map_err(|e| match e {
            ApiError::FfmpegFailed(diag) => ApiError::Decode(diag),
            other => other,
        })?;

        let text = String::from_utf8_lossy(&output.stdout);
        let seconds: f64 = text
            .trim()
            .parse()
            .map_err(|_| ApiError::Decode(format!("unreadable duration {:?}", text.trim())))?;
        if !seconds.is_finite() {
            return Err(ApiError::Decode("non-finite duration reported".to_string()));
        }
        Ok((seconds.max(0.0) * 1000.0).round() as u64)
    }

    /// Re-encode the first `limit_ms` of `src` to `dest`.
    ///
    /// Callers skip this entirely when the probed duration already fits the
    /// limit; trimming always happens before chunk planning.
    pub async fn trim(&self, src: &Path, limit_ms: u64, dest: &Path) -> Result<(), ApiError> {
        debug!("trimming {} to {} ms", src.display(), limit_ms);
        run_tool(
            Command::new("ffmpeg")
                .arg("-y")
                .arg("-i")
                .arg(src)
                .args(["-t", &format_ms(limit_ms)])
                .arg("-vn")
                .args(["-c:a", "libmp3lame"])
                .args(["-b:a", CHUNK_EXPORT_BITRATE])
                .arg(dest),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AudioSlicer for FfmpegTool {
    async fn duration_ms(&self, src: &Path) -> Result<u64, ApiError> {
        self.probe_duration_ms(src).await
    }

    async fn export_slice(
        &self,
        src: &Path,
        start_ms: u64,
        end_ms: u64,
        dest: &Path,
    ) -> Result<u64, ApiError> {
        let length_ms = end_ms.saturating_sub(start_ms);
        run_tool(
            Command::new("ffmpeg")
                .arg("-y")
                .args(["-ss", &format_ms(start_ms)])
                .arg("-i")
                .arg(src)
                .args(["-t", &format_ms(length_ms)])
                .arg("-vn")
                .args(["-c:a", "libmp3lame"])
                .args(["-b:a", CHUNK_EXPORT_BITRATE])
                .arg(dest),
        )
        .await?;

        let meta = tokio::fs::metadata(dest).await?;
        Ok(meta.len())
    }
}

/// Run one tool invocation to completion with captured output.
async fn run_tool(cmd: &mut Command) -> Result<std::process::Output, ApiError> {
    let output = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ApiError::FfmpegMissing,
            _ => ApiError::Io(e),
        })?;

    if !output.status.success() {
        return Err(ApiError::FfmpegFailed(diagnostic(
            &output.stderr,
            &output.stdout,
        )));
    }
    Ok(output)
}

/// Pick the most useful diagnostic text: stderr, then stdout, then a stub.
fn diagnostic(stderr: &[u8], stdout: &[u8]) -> String {
    for raw in [stderr, stdout] {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
    }
    "unknown ffmpeg error".to_string()
}

/// Milliseconds as an ffmpeg `seconds.millis` time value.
fn format_ms(ms: u64) -> String {
    format!("{}.{:03}", ms / 1000, ms % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(0), "0.000");
        assert_eq!(format_ms(1_500), "1.500");
        assert_eq!(format_ms(125_042), "125.042");
        assert_eq!(format_ms(7), "0.007");
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        assert_eq!(diagnostic(b"boom\n", b"out"), "boom");
        assert_eq!(diagnostic(b"  \n", b"fallback"), "fallback");
        assert_eq!(diagnostic(b"", b""), "unknown ffmpeg error");
    }
}
