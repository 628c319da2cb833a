//! Render worker binary.
//!
//! Runs the queue until interrupted. Timeline JSON files given as
//! arguments are submitted on startup.

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use vrender_media::{check_ffmpeg, FfmpegEncoder};
use vrender_models::Timeline;
use vrender_queue::{InMemoryJobStore, InMemoryTimelineStore, JobEvent, QueueManager, RenderJob};
use vrender_worker::{init_tracing, RenderPipeline, RenderService, ThumbnailRunner, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting vrender-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port, "Prometheus exporter listening");
    }

    match check_ffmpeg() {
        Ok(path) => info!(path = %path.display(), "FFmpeg found"),
        Err(e) => warn!("{}; render jobs will fail until it is installed", e),
    }

    let mut encoder = FfmpegEncoder::new();
    if let Some(timeout) = config.ffmpeg_timeout {
        encoder = encoder.with_timeout(timeout.as_secs());
    }
    let pipeline = RenderPipeline::new(Arc::new(encoder), &config.output_dir).with_ancillary(
        Arc::new(ThumbnailRunner::new(config.output_dir.join("thumbnails"))),
    );

    let queue = QueueManager::new(
        config.queue.clone(),
        Arc::new(InMemoryJobStore::new()),
        Arc::new(pipeline),
    );
    let service = RenderService::new(queue.clone())
        .with_timeline_store(Arc::new(InMemoryTimelineStore::new()));

    for path in std::env::args().skip(1) {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {path}"))?;
        let timeline: Timeline =
            serde_json::from_str(&raw).with_context(|| format!("Invalid timeline in {path}"))?;

        let estimate = service.estimate(&timeline);
        info!(
            path = %path,
            render_seconds = estimate.render_seconds,
            output_bytes = estimate.output_size_bytes,
            "Estimated render"
        );

        match service.submit_render(RenderJob::new(timeline)).await {
            Ok(id) => info!(job_id = %id, path = %path, "Timeline queued"),
            Err(e) => error!(path = %path, "Rejected timeline: {}", e),
        }
    }

    // Lifecycle events
    let mut events = queue.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(JobEvent::Progress(update)) => {
                    debug!(job_id = %update.job_id, percent = update.percent, stage = %update.stage, "Progress")
                }
                Ok(event) => info!(job_id = %event.job_id(), "Job event: {:?}", event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log lagging")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Periodic cleanup of finished jobs
    let cleanup_queue = queue.clone();
    let (cleanup_interval, cleanup_age) = (config.cleanup_interval, config.cleanup_age);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        loop {
            interval.tick().await;
            if let Err(e) = cleanup_queue.cleanup(cleanup_age).await {
                warn!("Job cleanup failed: {}", e);
            }
        }
    });

    // Setup signal handlers
    let shutdown_queue = queue.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_queue.shutdown();
    });

    queue.run().await.context("Queue manager failed")?;

    info!("Worker shutdown complete");
    Ok(())
}
