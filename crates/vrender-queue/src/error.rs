//! Queue error types.

use thiserror::Error;
use vrender_models::JobStatus;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} cannot go from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Queue is shutting down")]
    ShuttingDown,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn not_found(id: impl ToString) -> Self {
        Self::JobNotFound(id.to_string())
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
