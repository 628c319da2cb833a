//! Entry point for callers submitting renders.
//!
//! Validation and a compile check happen here, before any job exists, so a
//! broken timeline is reported to the caller instead of failing in a worker.

use std::sync::Arc;
use tracing::info;
use vrender_media::{validate, FiltergraphCompiler, RenderEstimate, RenderEstimator};
use vrender_models::{EncodingConfig, JobId, Timeline};
use vrender_queue::{
    AncillaryTask, BatchJob, Job, QueueManager, QueueStats, RenderJob, TimelineStore,
};

use crate::error::{WorkerError, WorkerResult};

/// Facade over the queue for render submission and tracking.
#[derive(Clone)]
pub struct RenderService {
    queue: QueueManager,
    estimator: RenderEstimator,
    timelines: Option<Arc<dyn TimelineStore>>,
}

impl RenderService {
    pub fn new(queue: QueueManager) -> Self {
        Self {
            queue,
            estimator: RenderEstimator::default(),
            timelines: None,
        }
    }

    pub fn with_estimator(mut self, estimator: RenderEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_timeline_store(mut self, store: Arc<dyn TimelineStore>) -> Self {
        self.timelines = Some(store);
        self
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    /// Validate and compile-check a timeline without submitting it.
    pub fn check(&self, timeline: &Timeline, encoding: &EncodingConfig) -> WorkerResult<()> {
        validate(timeline).map_err(WorkerError::Validation)?;
        FiltergraphCompiler::new(encoding.clone()).compile(timeline)?;
        Ok(())
    }

    /// Submit a render at default priority.
    pub async fn submit_render(&self, job: RenderJob) -> WorkerResult<JobId> {
        self.submit_render_with_priority(job, 0).await
    }

    pub async fn submit_render_with_priority(
        &self,
        job: RenderJob,
        priority: i32,
    ) -> WorkerResult<JobId> {
        self.check(&job.timeline, &job.encoding)?;

        if let (Some(store), Some(project)) = (&self.timelines, &job.project_id) {
            store.save_timeline(project, &job.timeline).await?;
        }

        let id = self
            .queue
            .submit(Job::render(job).with_priority(priority))
            .await?;
        info!(job_id = %id, priority, "Render submitted");
        Ok(id)
    }

    /// Render the timeline last saved for `project_id`.
    pub async fn submit_project(
        &self,
        project_id: &str,
        encoding: EncodingConfig,
    ) -> WorkerResult<JobId> {
        let store = self
            .timelines
            .as_ref()
            .ok_or_else(|| WorkerError::TimelineNotFound(project_id.to_string()))?;
        let timeline = store
            .load_timeline(project_id)
            .await?
            .ok_or_else(|| WorkerError::TimelineNotFound(project_id.to_string()))?;

        self.submit_render(
            RenderJob::new(timeline)
                .with_encoding(encoding)
                .with_project(project_id),
        )
        .await
    }

    /// Submit several timelines as one job. Every timeline is checked first.
    pub async fn submit_batch(&self, batch: BatchJob) -> WorkerResult<JobId> {
        if batch.timelines.is_empty() {
            return Err(WorkerError::invalid_job("batch has no timelines"));
        }
        for timeline in &batch.timelines {
            self.check(timeline, &batch.encoding)?;
        }
        Ok(self.queue.submit(Job::batch(batch)).await?)
    }

    pub async fn submit_ancillary(&self, task: AncillaryTask) -> WorkerResult<JobId> {
        Ok(self.queue.submit(Job::ancillary(task)).await?)
    }

    pub fn estimate(&self, timeline: &Timeline) -> RenderEstimate {
        self.estimator.estimate(timeline)
    }

    pub async fn status(&self, id: &JobId) -> WorkerResult<Job> {
        Ok(self.queue.status(id).await?)
    }

    pub async fn cancel(&self, id: &JobId) -> WorkerResult<bool> {
        Ok(self.queue.cancel(id).await?)
    }

    pub async fn stats(&self) -> WorkerResult<QueueStats> {
        Ok(self.queue.stats().await?)
    }
}
