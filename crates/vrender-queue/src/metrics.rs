//! Queue metrics.

use metrics::{counter, gauge, histogram};
use vrender_models::JobKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "vrender_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vrender_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vrender_jobs_failed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "vrender_jobs_retried_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "vrender_jobs_cancelled_total";
    pub const JOBS_IN_FLIGHT: &str = "vrender_jobs_in_flight";
    pub const JOB_DURATION_SECONDS: &str = "vrender_job_duration_seconds";
}

fn kind_label(kind: JobKind) -> [(&'static str, String); 1] {
    [("kind", kind.as_str().to_string())]
}

pub fn record_submitted(kind: JobKind) {
    counter!(names::JOBS_SUBMITTED_TOTAL, &kind_label(kind)).increment(1);
}

pub fn record_completed(kind: JobKind, duration_secs: f64) {
    let labels = kind_label(kind);
    counter!(names::JOBS_COMPLETED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_failed(kind: JobKind) {
    counter!(names::JOBS_FAILED_TOTAL, &kind_label(kind)).increment(1);
}

pub fn record_retried(kind: JobKind) {
    counter!(names::JOBS_RETRIED_TOTAL, &kind_label(kind)).increment(1);
}

pub fn record_cancelled(kind: JobKind) {
    counter!(names::JOBS_CANCELLED_TOTAL, &kind_label(kind)).increment(1);
}

pub fn set_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}
