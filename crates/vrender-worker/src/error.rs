//! Worker error types.

use thiserror::Error;
use vrender_media::{CompileError, MediaError, ValidationError};
use vrender_queue::{JobFailure, QueueError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Validation error: {}", summarize(.0))]
    Validation(Vec<ValidationError>),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Encode error: {0}")]
    Media(#[from] MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Ancillary error: {0}")]
    Ancillary(String),

    #[error("Unsupported job: {0}")]
    Unsupported(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Timeline not found: {0}")]
    TimelineNotFound(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl WorkerError {
    pub fn ancillary(msg: impl Into<String>) -> Self {
        Self::Ancillary(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    /// Whether the FFmpeg deadline fired.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkerError::Media(MediaError::Timeout(_)))
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            WorkerError::Cancelled => true,
            WorkerError::Media(e) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Check if error is retryable.
    ///
    /// Validation and compile errors are deterministic; so is a missing
    /// FFmpeg binary or a graph the FFmpeg translation rejects.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Media(e) => !matches!(
                e,
                MediaError::Cancelled | MediaError::FfmpegNotFound | MediaError::InvalidGraph(_)
            ),
            WorkerError::Ancillary(_) | WorkerError::Io(_) => true,
            _ => false,
        }
    }
}

impl From<WorkerError> for JobFailure {
    fn from(err: WorkerError) -> Self {
        if err.is_cancelled() {
            JobFailure::cancelled()
        } else if err.is_timeout() {
            JobFailure::timeout()
        } else if err.is_retryable() {
            JobFailure::retryable(err.to_string())
        } else {
            JobFailure::permanent(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrender_queue::TIMEOUT_ERROR;

    #[test]
    fn test_classification() {
        let compile = WorkerError::from(CompileError::NothingToRender);
        assert!(!compile.is_retryable());
        let failure = JobFailure::from(compile);
        assert!(!failure.retryable);
        assert!(failure.message.starts_with("Compile error:"));

        let encode = WorkerError::from(MediaError::ffmpeg_failed("exit 1", None, Some(1)));
        assert!(encode.is_retryable());
        assert!(JobFailure::from(encode).message.starts_with("Encode error:"));

        let cancelled = JobFailure::from(WorkerError::from(MediaError::Cancelled));
        assert!(cancelled.cancelled);
        assert!(!cancelled.retryable);
    }

    #[test]
    fn test_encoder_deadline_is_recorded_as_timeout() {
        let err = WorkerError::from(MediaError::Timeout(3600));
        assert!(err.is_timeout());
        assert!(err.is_retryable());

        let failure = JobFailure::from(err);
        assert_eq!(failure.message, TIMEOUT_ERROR);
        assert!(failure.retryable);
        assert!(!failure.cancelled);
    }

    #[test]
    fn test_validation_message_lists_every_error() {
        let err = WorkerError::Validation(vec![
            ValidationError::NoContent,
            ValidationError::InvalidSettings {
                reason: "fps must be positive".to_string(),
            },
        ]);
        let message = err.to_string();
        assert!(message.contains("timeline has no clips"));
        assert!(message.contains("fps must be positive"));
    }
}
