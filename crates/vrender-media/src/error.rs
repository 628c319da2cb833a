//! Error types for media operations.

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Result type for filtergraph compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors that can occur while executing a render.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an invalid graph error.
    pub fn invalid_graph(message: impl Into<String>) -> Self {
        Self::InvalidGraph(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the error came from a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }
}

/// Errors raised by the filtergraph compiler.
///
/// Compilation is deterministic, so none of these are worth retrying.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("track '{track_id}' has unsupported type '{kind}'")]
    UnsupportedTrackKind { track_id: String, kind: String },

    #[error("clip '{clip_id}' carries {content_kind} content on {track_kind} track '{track_id}'")]
    ContentKindMismatch {
        track_id: String,
        clip_id: String,
        track_kind: String,
        content_kind: String,
    },

    #[error("clip '{clip_id}' has invalid timing (start {start}, duration {duration})")]
    InvalidTiming {
        clip_id: String,
        start: f64,
        duration: f64,
    },

    #[error("timeline has no visible video or audible audio content")]
    NothingToRender,
}
