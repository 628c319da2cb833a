//! Queue configuration.

use std::time::Duration;

use crate::job::DEFAULT_MAX_ATTEMPTS;
use crate::retry::RetryPolicy;

/// Queue manager configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum jobs processing at once
    pub max_concurrent: usize,
    /// Fallback wake-up when no event arrives
    pub poll_interval: Duration,
    /// Deadline for a single attempt
    pub job_timeout: Option<Duration>,
    /// Attempt budget applied to submitted jobs that keep the default
    pub max_attempts: u32,
    pub retry: RetryPolicy,
    /// How long `run` waits for in-flight jobs after shutdown
    pub shutdown_grace: Duration,
    /// Buffered progress updates per subscriber
    pub progress_capacity: usize,
    /// Buffered lifecycle events per subscriber
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            poll_interval: Duration::from_millis(500),
            job_timeout: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry: RetryPolicy::default(),
            shutdown_grace: Duration::from_secs(60),
            progress_capacity: 64,
            event_capacity: 256,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let job_timeout = std::env::var("RENDER_JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let retry = RetryPolicy {
            base_delay: Duration::from_millis(
                std::env::var("RENDER_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.base_delay.as_millis() as u64),
            ),
            max_delay: Duration::from_millis(
                std::env::var("RENDER_RETRY_MAX_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.retry.max_delay.as_millis() as u64),
            ),
            jitter: std::env::var("RENDER_RETRY_JITTER")
                .map(|s| s != "false" && s != "0")
                .unwrap_or(defaults.retry.jitter),
        };

        Self {
            max_concurrent: std::env::var("RENDER_MAX_CONCURRENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent),
            poll_interval: Duration::from_millis(
                std::env::var("RENDER_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.poll_interval.as_millis() as u64),
            ),
            job_timeout,
            max_attempts: std::env::var("RENDER_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            retry,
            shutdown_grace: Duration::from_secs(
                std::env::var("RENDER_SHUTDOWN_GRACE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.shutdown_grace.as_secs()),
            ),
            ..defaults
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}
