//! Request error taxonomy and its HTTP mapping.
//!
//! Every failure the pipeline can hit maps to exactly one variant here, so
//! callers (and tests) can distinguish user mistakes from local tool
//! failures and remote service trouble without string matching.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad upload or query parameters; nothing was processed.
    #[error("{0}")]
    InvalidInput(String),

    /// ffmpeg/ffprobe is not installed or not on PATH.
    #[error("ffmpeg is required for audio processing but was not found on PATH")]
    FfmpegMissing,

    /// ffmpeg exited non-zero; carries the tool's diagnostic output.
    #[error("ffmpeg conversion failed: {0}")]
    FfmpegFailed(String),

    /// The source's duration could not be determined for chunk planning.
    #[error("could not decode audio: {0}")]
    Decode(String),

    /// Halving reached the minimum chunk duration and the export was still
    /// over the service's size ceiling.
    #[error("unable to split audio below the speech service size limit; reduce bitrate or duration and try again")]
    ChunkTooLarge,

    /// Remote transcription call failed (transport, status, or parse).
    #[error("transcription failed: {0}")]
    Service(String),

    /// The service returned neither timed segments nor usable text.
    #[error("no transcription segments returned by the speech service")]
    NoTranscript,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::ChunkTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Service(_) | Self::NoTranscript => StatusCode::BAD_GATEWAY,
            Self::FfmpegMissing | Self::FfmpegFailed(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("request failed: {}", self);
        } else {
            log::warn!("request rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::InvalidInput("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Decode("no duration".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::ChunkTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            ApiError::Service("timeout".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ApiError::NoTranscript.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ApiError::FfmpegMissing.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
