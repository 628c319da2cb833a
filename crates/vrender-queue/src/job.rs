//! Job payloads and the job lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use vrender_models::{EncodingConfig, JobId, JobKind, JobStatus, Timeline};

use crate::error::{QueueError, QueueResult};

/// Default number of attempts before a job fails permanently.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Error recorded on a job cancelled by a caller.
pub const CANCELLED_ERROR: &str = "cancelled";

/// Error recorded on a job whose deadline fired.
pub const TIMEOUT_ERROR: &str = "timeout";

/// Compose one timeline into a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    pub timeline: Timeline,
    #[serde(default)]
    pub encoding: EncodingConfig,
    /// Owning project, used for output naming
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl RenderJob {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            encoding: EncodingConfig::default(),
            project_id: None,
        }
    }

    pub fn with_encoding(mut self, encoding: EncodingConfig) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Compose several timelines, one after another, within one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub timelines: Vec<Timeline>,
    #[serde(default)]
    pub encoding: EncodingConfig,
}

impl BatchJob {
    pub fn new(timelines: Vec<Timeline>) -> Self {
        Self {
            timelines,
            encoding: EncodingConfig::default(),
        }
    }
}

/// Media generation delegated to an external service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum AncillaryTask {
    /// Text-to-speech narration
    Tts { text: String, voice: String },
    /// Talking avatar driven by an audio track
    Avatar { avatar_id: String, audio_url: String },
    /// Still frame from a rendered video
    Thumbnail { video_url: String, at_secs: f64 },
}

impl AncillaryTask {
    pub fn name(&self) -> &'static str {
        match self {
            AncillaryTask::Tts { .. } => "tts",
            AncillaryTask::Avatar { .. } => "avatar",
            AncillaryTask::Thumbnail { .. } => "thumbnail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncillaryJob {
    #[serde(flatten)]
    pub task: AncillaryTask,
}

/// Type-specific job data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobPayload {
    Render(RenderJob),
    Batch(BatchJob),
    Ancillary(AncillaryJob),
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Render(_) => JobKind::Render,
            JobPayload::Batch(_) => JobKind::Batch,
            JobPayload::Ancillary(_) => JobKind::Ancillary,
        }
    }
}

/// A rendered file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderArtifact {
    pub path: String,
    pub duration: f64,
    pub size_bytes: u64,
}

/// Type-specific job result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobOutput {
    Render(RenderArtifact),
    Batch(Vec<RenderArtifact>),
    Ancillary { url: String },
}

/// What a failed attempt led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Returned to pending for another attempt
    Retry,
    /// Terminal failure
    Failed,
}

/// A schedulable, retryable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub attempts: u32,
    /// Attempt budget; `None` takes the queue's configured default on submit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Higher runs first
    pub priority: i32,
    /// Submission order, tie-breaker after `created_at`
    #[serde(default)]
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobOutput>,
    /// 0-100
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Earliest time a retry may be dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job.
    pub fn new(payload: JobPayload) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind: payload.kind(),
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: None,
            priority: 0,
            sequence: 0,
            created_at: now,
            updated_at: now,
            error: None,
            result: None,
            progress: 0.0,
            stage: None,
            available_at: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn render(job: RenderJob) -> Self {
        Self::new(JobPayload::Render(job))
    }

    pub fn batch(job: BatchJob) -> Self {
        Self::new(JobPayload::Batch(job))
    }

    pub fn ancillary(task: AncillaryTask) -> Self {
        Self::new(JobPayload::Ancillary(AncillaryJob { task }))
    }

    pub fn with_id(mut self, id: JobId) -> Self {
        self.id = id;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the attempt budget (at least one).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Effective attempt budget.
    pub fn attempt_budget(&self) -> u32 {
        self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1)
    }

    /// Whether another attempt may still be started.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.attempt_budget()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the scheduler may start this job at `now`.
    pub fn is_dispatchable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self.has_attempts_left()
            && self.available_at.map_or(true, |at| at <= now)
    }

    /// Dispatch order: priority descending, then oldest first.
    pub fn dispatch_order(a: &Job, b: &Job) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.sequence.cmp(&b.sequence))
    }

    fn invalid(&self, to: JobStatus) -> QueueError {
        QueueError::InvalidTransition {
            job_id: self.id.to_string(),
            from: self.status,
            to,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// `pending -> processing`, consuming one attempt.
    pub fn start(&mut self) -> QueueResult<()> {
        if self.status != JobStatus::Pending || !self.has_attempts_left() {
            return Err(self.invalid(JobStatus::Processing));
        }
        self.status = JobStatus::Processing;
        self.attempts += 1;
        self.available_at = None;
        self.progress = 0.0;
        self.stage = None;
        self.touch();
        self.started_at = Some(self.updated_at);
        Ok(())
    }

    /// `processing -> completed`.
    pub fn complete(&mut self, output: JobOutput) -> QueueResult<()> {
        if self.status != JobStatus::Processing {
            return Err(self.invalid(JobStatus::Completed));
        }
        self.status = JobStatus::Completed;
        self.result = Some(output);
        self.error = None;
        self.progress = 100.0;
        self.touch();
        self.finished_at = Some(self.updated_at);
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Goes back to pending only when `retryable` and attempts remain;
    /// `retry_at` then delays the next dispatch.
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        retryable: bool,
        retry_at: Option<DateTime<Utc>>,
    ) -> QueueResult<FailureOutcome> {
        if self.status != JobStatus::Processing {
            return Err(self.invalid(JobStatus::Failed));
        }
        self.error = Some(error.into());
        self.touch();

        if retryable && self.has_attempts_left() {
            self.status = JobStatus::Pending;
            self.available_at = retry_at;
            Ok(FailureOutcome::Retry)
        } else {
            self.status = JobStatus::Failed;
            self.available_at = None;
            self.finished_at = Some(self.updated_at);
            Ok(FailureOutcome::Failed)
        }
    }

    /// `pending -> failed` for a job that was never dispatched again.
    pub fn cancel(&mut self) -> QueueResult<()> {
        if self.status != JobStatus::Pending {
            return Err(self.invalid(JobStatus::Failed));
        }
        self.status = JobStatus::Failed;
        self.error = Some(CANCELLED_ERROR.to_string());
        self.available_at = None;
        self.touch();
        self.finished_at = Some(self.updated_at);
        Ok(())
    }

    /// Wall-clock time of the latest attempt, once finished.
    pub fn processing_time_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrender_models::TimelineSettings;

    fn job() -> Job {
        Job::render(RenderJob::new(Timeline::new(vec![], TimelineSettings::default())))
    }

    #[test]
    fn test_happy_lifecycle() {
        let mut job = job();
        assert_eq!(job.kind, JobKind::Render);
        assert_eq!(job.status, JobStatus::Pending);

        job.start().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.attempts, 1);

        job.complete(JobOutput::Ancillary {
            url: "s3://out".to_string(),
        })
        .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.processing_time_ms().is_some());
    }

    #[test]
    fn test_retry_bound() {
        let mut job = job().with_max_attempts(3);

        for attempt in 1..=3 {
            job.start().unwrap();
            assert_eq!(job.attempts, attempt);
            let outcome = job.fail("encoder exploded", true, None).unwrap();
            if attempt < 3 {
                assert_eq!(outcome, FailureOutcome::Retry);
                assert_eq!(job.status, JobStatus::Pending);
            } else {
                assert_eq!(outcome, FailureOutcome::Failed);
            }
        }

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 3);
        assert!(job.start().is_err());
    }

    #[test]
    fn test_attempt_budget_defaults_and_floor() {
        let unset = job();
        assert_eq!(unset.max_attempts, None);
        assert_eq!(unset.attempt_budget(), DEFAULT_MAX_ATTEMPTS);

        // A zero budget from JSON still allows one attempt.
        let mut zero = job();
        zero.max_attempts = Some(0);
        assert_eq!(zero.attempt_budget(), 1);
        assert!(zero.is_dispatchable(Utc::now()));
        zero.start().unwrap();
        assert_eq!(
            zero.fail("flaky", true, None).unwrap(),
            FailureOutcome::Failed
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = job();
        job.start().unwrap();
        job.fail("bad graph", false, None).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);

        assert!(job.start().is_err());
        assert!(job.cancel().is_err());
        assert!(job
            .complete(JobOutput::Ancillary { url: String::new() })
            .is_err());
        assert!(job.fail("again", true, None).is_err());
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_cancel_only_from_pending() {
        let mut pending = job();
        pending.cancel().unwrap();
        assert_eq!(pending.status, JobStatus::Failed);
        assert_eq!(pending.error.as_deref(), Some(CANCELLED_ERROR));

        let mut running = job();
        running.start().unwrap();
        assert!(running.cancel().is_err());
    }

    #[test]
    fn test_dispatch_order() {
        let low = job().with_priority(1);
        let high = job().with_priority(10);
        let mut older = job().with_priority(1);
        older.created_at = low.created_at - chrono::Duration::seconds(5);

        let mut jobs = vec![low.clone(), high.clone(), older.clone()];
        jobs.sort_by(Job::dispatch_order);
        assert_eq!(jobs[0].id, high.id);
        assert_eq!(jobs[1].id, older.id);
        assert_eq!(jobs[2].id, low.id);
    }

    #[test]
    fn test_delayed_retry_not_dispatchable() {
        let mut job = job();
        job.start().unwrap();
        let later = Utc::now() + chrono::Duration::seconds(30);
        job.fail("flaky", true, Some(later)).unwrap();

        assert!(!job.is_dispatchable(Utc::now()));
        assert!(job.is_dispatchable(later));
    }

    #[test]
    fn test_payload_json_is_tagged() {
        let job = Job::ancillary(AncillaryTask::Tts {
            text: "hello".to_string(),
            voice: "pt-BR".to_string(),
        });
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["kind"], "ancillary");
        assert_eq!(value["payload"]["type"], "ancillary");
        assert_eq!(value["payload"]["data"]["task"], "tts");

        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }
}
