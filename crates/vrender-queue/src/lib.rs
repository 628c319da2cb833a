//! Render job queue.
//!
//! This crate provides:
//! - Job payloads and the job lifecycle state machine
//! - Pluggable job/timeline storage with in-memory defaults
//! - Bounded-concurrency scheduling with priorities, retries and timeouts
//! - Per-job progress channels and lifecycle events

pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod manager;
pub mod metrics;
pub mod progress;
pub mod retry;
pub mod store;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use handler::{JobContext, JobFailure, JobHandler};
pub use job::{
    AncillaryJob, AncillaryTask, BatchJob, FailureOutcome, Job, JobOutput, JobPayload,
    RenderArtifact, RenderJob, CANCELLED_ERROR, DEFAULT_MAX_ATTEMPTS, TIMEOUT_ERROR,
};
pub use manager::{QueueManager, QueueStats};
pub use progress::{JobEvent, ProgressHub, ProgressReporter};
pub use retry::RetryPolicy;
pub use store::{InMemoryJobStore, InMemoryTimelineStore, JobStore, TimelineStore};
