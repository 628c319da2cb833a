//! Boundary between the queue and the code that actually runs jobs.

use async_trait::async_trait;
use std::fmt;
use tokio::sync::watch;
use vrender_models::JobId;

use crate::job::{Job, JobOutput, CANCELLED_ERROR, TIMEOUT_ERROR};
use crate::progress::ProgressReporter;

/// Why an attempt failed, and whether another attempt can help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub message: String,
    pub retryable: bool,
    pub cancelled: bool,
}

impl JobFailure {
    /// Transient failure, e.g. an encoder error.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            cancelled: false,
        }
    }

    /// Deterministic failure, e.g. a compile error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            cancelled: false,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            message: CANCELLED_ERROR.to_string(),
            retryable: false,
            cancelled: true,
        }
    }

    pub fn timeout() -> Self {
        Self::retryable(TIMEOUT_ERROR)
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for JobFailure {}

/// Everything a handler gets besides the job itself.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    /// 1-based attempt number
    pub attempt: u32,
    pub progress: ProgressReporter,
    cancel: watch::Receiver<bool>,
}

impl JobContext {
    pub fn new(
        job_id: JobId,
        attempt: u32,
        progress: ProgressReporter,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            job_id,
            attempt,
            progress,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Safe-point check: `Err(cancelled)` once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), JobFailure> {
        if self.is_cancelled() {
            Err(JobFailure::cancelled())
        } else {
            Ok(())
        }
    }

    /// Receiver to hand to long-running collaborators.
    pub fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel.clone()
    }
}

/// Executes one attempt of a job.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn handle(&self, job: &Job, ctx: JobContext) -> Result<JobOutput, JobFailure>;
}
