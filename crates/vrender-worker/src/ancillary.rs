//! Ancillary media generation (narration, avatars, thumbnails).
//!
//! Speech and avatar synthesis live in external services, so the worker
//! only depends on the [`AncillaryRunner`] trait. Thumbnails need nothing
//! but FFmpeg and have a local implementation.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;
use vrender_media::{FfmpegCommand, FfmpegRunner};
use vrender_queue::{AncillaryTask, JobContext};

use crate::error::{WorkerError, WorkerResult};

/// Produces one asset for an ancillary task and returns its URL.
#[async_trait]
pub trait AncillaryRunner: Send + Sync {
    async fn run(&self, task: &AncillaryTask, ctx: &JobContext) -> WorkerResult<String>;
}

/// Extracts a still frame with FFmpeg. Other tasks are rejected.
#[derive(Debug, Clone)]
pub struct ThumbnailRunner {
    output_dir: PathBuf,
}

impl ThumbnailRunner {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// FFmpeg invocation grabbing one frame at `at_secs`.
    pub fn command(&self, video_url: &str, at_secs: f64, stem: &str) -> FfmpegCommand {
        let output = self.output_dir.join(format!("{stem}.jpg"));
        FfmpegCommand::new(output)
            .input_with_args(video_url, ["-ss".to_string(), format!("{:.3}", at_secs.max(0.0))])
            .output_args(["-frames:v", "1", "-q:v", "2"])
    }
}

#[async_trait]
impl AncillaryRunner for ThumbnailRunner {
    async fn run(&self, task: &AncillaryTask, ctx: &JobContext) -> WorkerResult<String> {
        let AncillaryTask::Thumbnail { video_url, at_secs } = task else {
            return Err(WorkerError::unsupported(format!(
                "no runner configured for {} tasks",
                task.name()
            )));
        };

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let cmd = self.command(video_url, *at_secs, ctx.job_id.as_str());

        info!(job_id = %ctx.job_id, at_secs, "Extracting thumbnail");
        FfmpegRunner::new()
            .with_cancel(ctx.cancel_signal())
            .run(&cmd)
            .await?;

        Ok(format!("file://{}", cmd.output_path().display()))
    }
}
