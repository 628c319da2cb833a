//! Job handler turning queued jobs into rendered files.
//!
//! Every attempt recompiles the timeline; compile errors fail the job
//! without a retry while encoder errors are left to the queue's retry
//! policy.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;
use vrender_media::{EncodeProgress, Encoder, FiltergraphCompiler, RenderRequest};
use vrender_models::{EncodingConfig, JobId, RenderStage, Timeline};
use vrender_queue::{
    AncillaryJob, BatchJob, Job, JobContext, JobFailure, JobHandler, JobOutput, JobPayload,
    RenderArtifact, RenderJob,
};

use crate::ancillary::AncillaryRunner;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Portion of overall progress a single render covers.
#[derive(Debug, Clone, Copy)]
struct ProgressWindow {
    offset: f64,
    span: f64,
}

impl ProgressWindow {
    const FULL: ProgressWindow = ProgressWindow {
        offset: 0.0,
        span: 100.0,
    };

    fn nth_of(index: usize, count: usize) -> Self {
        let span = 100.0 / count.max(1) as f64;
        Self {
            offset: span * index as f64,
            span,
        }
    }

    fn map(&self, percent: f64) -> f64 {
        self.offset + percent.clamp(0.0, 100.0) * self.span / 100.0
    }
}

/// Handles render, batch and ancillary jobs.
pub struct RenderPipeline {
    encoder: Arc<dyn Encoder>,
    ancillary: Option<Arc<dyn AncillaryRunner>>,
    output_dir: PathBuf,
}

impl RenderPipeline {
    pub fn new(encoder: Arc<dyn Encoder>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            encoder,
            ancillary: None,
            output_dir: output_dir.into(),
        }
    }

    pub fn with_ancillary(mut self, runner: Arc<dyn AncillaryRunner>) -> Self {
        self.ancillary = Some(runner);
        self
    }

    async fn render_timeline(
        &self,
        job_id: &JobId,
        timeline: &Timeline,
        encoding: &EncodingConfig,
        file_stem: String,
        window: ProgressWindow,
        ctx: &JobContext,
    ) -> WorkerResult<RenderArtifact> {
        ctx.progress
            .report(window.map(0.0), RenderStage::Compiling.as_str());
        let graph = FiltergraphCompiler::new(encoding.clone()).compile(timeline)?;

        if ctx.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }

        let reporter = ctx.progress.clone();
        let on_progress: EncodeProgress = Arc::new(move |percent: f64| {
            reporter.report(window.map(percent), RenderStage::Encoding.as_str())
        });
        let request =
            RenderRequest::new(job_id.to_string(), &self.output_dir).with_file_stem(file_stem);

        let rendered = self
            .encoder
            .render(&graph, &request, on_progress, ctx.cancel_signal())
            .await?;

        Ok(RenderArtifact {
            path: rendered.path.display().to_string(),
            duration: rendered.duration,
            size_bytes: rendered.size_bytes,
        })
    }

    async fn run_render(
        &self,
        job_id: &JobId,
        render: &RenderJob,
        ctx: &JobContext,
        logger: &JobLogger,
    ) -> WorkerResult<JobOutput> {
        logger.log_start(&format!(
            "{} tracks, {} clips, {:.2}s",
            render.timeline.track_count(),
            render.timeline.clip_count(),
            render.timeline.total_duration
        ));

        let stem = match &render.project_id {
            Some(project) => format!("{project}-{job_id}"),
            None => job_id.to_string(),
        };
        let artifact = self
            .render_timeline(
                job_id,
                &render.timeline,
                &render.encoding,
                stem,
                ProgressWindow::FULL,
                ctx,
            )
            .await?;

        ctx.progress.report(100.0, RenderStage::Finalizing.as_str());
        Ok(JobOutput::Render(artifact))
    }

    async fn run_batch(
        &self,
        job_id: &JobId,
        batch: &BatchJob,
        ctx: &JobContext,
        logger: &JobLogger,
    ) -> WorkerResult<JobOutput> {
        let count = batch.timelines.len();
        if count == 0 {
            return Err(WorkerError::invalid_job("batch has no timelines"));
        }
        logger.log_start(&format!("{count} timelines"));

        let mut artifacts = Vec::with_capacity(count);
        for (index, timeline) in batch.timelines.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(WorkerError::Cancelled);
            }
            let artifact = self
                .render_timeline(
                    job_id,
                    timeline,
                    &batch.encoding,
                    format!("{job_id}-{index}"),
                    ProgressWindow::nth_of(index, count),
                    ctx,
                )
                .await?;
            logger.log_progress(&format!("rendered {}/{}", index + 1, count));
            artifacts.push(artifact);
        }

        ctx.progress.report(100.0, RenderStage::Finalizing.as_str());
        Ok(JobOutput::Batch(artifacts))
    }

    async fn run_ancillary(
        &self,
        ancillary: &AncillaryJob,
        ctx: &JobContext,
        logger: &JobLogger,
    ) -> WorkerResult<JobOutput> {
        let runner = self.ancillary.as_ref().ok_or_else(|| {
            WorkerError::unsupported(format!(
                "no runner configured for {} tasks",
                ancillary.task.name()
            ))
        })?;
        logger.log_start(ancillary.task.name());

        ctx.progress.report(0.0, RenderStage::Generating.as_str());
        let url = runner.run(&ancillary.task, ctx).await?;
        ctx.progress.report(100.0, RenderStage::Finalizing.as_str());

        Ok(JobOutput::Ancillary { url })
    }
}

#[async_trait]
impl JobHandler for RenderPipeline {
    async fn handle(&self, job: &Job, ctx: JobContext) -> Result<JobOutput, JobFailure> {
        let operation = match &job.payload {
            JobPayload::Ancillary(ancillary) => ancillary.task.name(),
            _ => job.kind.as_str(),
        };
        let logger = JobLogger::new(&job.id, operation);
        let span = logger.create_span(ctx.attempt);

        let result = async {
            match &job.payload {
                JobPayload::Render(render) => self.run_render(&job.id, render, &ctx, &logger).await,
                JobPayload::Batch(batch) => self.run_batch(&job.id, batch, &ctx, &logger).await,
                JobPayload::Ancillary(ancillary) => {
                    self.run_ancillary(ancillary, &ctx, &logger).await
                }
            }
        }
        .instrument(span)
        .await;

        match result {
            Ok(output) => {
                logger.log_completion(&format!("attempt {}", ctx.attempt));
                Ok(output)
            }
            Err(e) if e.is_cancelled() => {
                logger.log_warning("cancelled");
                Err(e.into())
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                Err(e.into())
            }
        }
    }
}
