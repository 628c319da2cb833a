//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use vrender_queue::QueueConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Directory rendered files are written to
    pub output_dir: PathBuf,
    /// Kill a single FFmpeg run after this long
    pub ffmpeg_timeout: Option<Duration>,
    /// Port for the Prometheus exporter, disabled when unset
    pub metrics_port: Option<u16>,
    /// How often finished jobs are swept from the store
    pub cleanup_interval: Duration,
    /// Age after which finished jobs are swept
    pub cleanup_age: Duration,
    /// Scheduling settings
    pub queue: QueueConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("/tmp/vrender"),
            ffmpeg_timeout: Some(Duration::from_secs(3600)),
            metrics_port: None,
            cleanup_interval: Duration::from_secs(600),
            cleanup_age: Duration::from_secs(24 * 3600),
            queue: QueueConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            output_dir: std::env::var("WORKER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/vrender")),
            ffmpeg_timeout: std::env::var("WORKER_FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map_or(Some(Duration::from_secs(3600)), |secs| {
                    (secs > 0).then(|| Duration::from_secs(secs))
                }),
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
            cleanup_interval: Duration::from_secs(
                std::env::var("WORKER_CLEANUP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            cleanup_age: Duration::from_secs(
                std::env::var("WORKER_CLEANUP_AGE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(24 * 3600),
            ),
            queue: QueueConfig::from_env(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }
}
