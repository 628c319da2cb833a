//! End-to-end queue + pipeline scenarios with an in-process encoder.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use vrender_media::{
    CompiledGraph, EncodeProgress, Encoder, GraphOp, MediaError, MediaResult, RenderRequest,
    RenderedOutput, ValidationError,
};
use vrender_models::{
    Clip, ClipContent, ContentKind, JobStatus, Timeline, TimelineSettings, Track, TrackKind,
};
use vrender_queue::{
    AncillaryTask, BatchJob, InMemoryJobStore, InMemoryTimelineStore, Job, JobOutput,
    QueueConfig, QueueManager, RenderJob, RetryPolicy, CANCELLED_ERROR, TIMEOUT_ERROR,
};
use vrender_worker::{RenderPipeline, RenderService, WorkerError};

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    TimeOut,
    WaitForCancel,
}

struct FakeEncoder {
    behaviour: Behaviour,
    calls: AtomicUsize,
    graphs: Mutex<Vec<CompiledGraph>>,
}

impl FakeEncoder {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            calls: AtomicUsize::new(0),
            graphs: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn render(
        &self,
        graph: &CompiledGraph,
        request: &RenderRequest,
        on_progress: EncodeProgress,
        mut cancel: watch::Receiver<bool>,
    ) -> MediaResult<RenderedOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.graphs.lock().unwrap().push(graph.clone());

        match self.behaviour {
            Behaviour::Succeed => {
                on_progress(50.0);
                on_progress(100.0);
                Ok(RenderedOutput {
                    path: request.output_path(graph),
                    duration: graph.duration,
                    size_bytes: 1024,
                })
            }
            Behaviour::Fail => Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some("Invalid data found when processing input".to_string()),
                Some(1),
            )),
            Behaviour::TimeOut => Err(MediaError::Timeout(3600)),
            Behaviour::WaitForCancel => {
                while !*cancel.borrow() {
                    if cancel.changed().await.is_err() {
                        break;
                    }
                }
                Err(MediaError::Cancelled)
            }
        }
    }
}

struct Harness {
    service: RenderService,
    encoder: Arc<FakeEncoder>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new(behaviour: Behaviour) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let encoder = FakeEncoder::new(behaviour);
        let pipeline = RenderPipeline::new(Arc::clone(&encoder) as Arc<dyn Encoder>, dir.path());
        let config = QueueConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_retry(RetryPolicy::immediate());
        let queue = QueueManager::new(config, Arc::new(InMemoryJobStore::new()), Arc::new(pipeline));
        let service = RenderService::new(queue)
            .with_timeline_store(Arc::new(InMemoryTimelineStore::new()));

        Self {
            service,
            encoder,
            _dir: dir,
        }
    }

    fn queue(&self) -> &QueueManager {
        self.service.queue()
    }
}

fn happy_timeline() -> Timeline {
    Timeline::new(
        vec![
            Track::new("video", TrackKind::Video, "Video").with_clip(Clip::new(
                "intro",
                0.0,
                10.0,
                ClipContent::new("https://cdn.test/intro.mp4", ContentKind::Video),
            )),
            Track::new("music", TrackKind::Audio, "Music").with_clip(
                Clip::new(
                    "bed",
                    0.0,
                    8.0,
                    ClipContent::new("https://cdn.test/bed.mp3", ContentKind::Audio),
                )
                .with_volume(50.0),
            ),
        ],
        TimelineSettings::default(),
    )
}

async fn wait_for_status(queue: &QueueManager, job: &vrender_models::JobId, status: JobStatus) {
    for _ in 0..500 {
        if queue.status(job).await.unwrap().status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job} never reached {status}");
}

#[tokio::test]
async fn test_happy_path_render() {
    let harness = Harness::new(Behaviour::Succeed);
    let id = harness
        .service
        .submit_render(RenderJob::new(happy_timeline()).with_project("promo"))
        .await
        .unwrap();
    let mut progress = harness.queue().subscribe_progress(&id);

    harness.queue().run_until_idle().await.unwrap();

    let job = harness.service.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.progress, 100.0);
    match job.result {
        Some(JobOutput::Render(artifact)) => {
            assert_eq!(artifact.duration, 10.0);
            assert!(artifact.path.ends_with(&format!("promo-{id}.mp4")));
        }
        other => panic!("unexpected result {other:?}"),
    }

    let graphs = harness.encoder.graphs.lock().unwrap().clone();
    assert_eq!(graphs.len(), 1);
    let graph = &graphs[0];
    assert_eq!(graph.ops_named("trim").count(), 2);
    assert_eq!(graph.ops_named("set_volume").count(), 1);
    assert_eq!(graph.ops_named("overlay").count(), 0);
    assert!(graph
        .ops_named("mix_audio")
        .any(|op| matches!(op, GraphOp::MixAudio { inputs, .. } if inputs.len() == 1)));
    assert_eq!(graph.output_spec.width, 1920);
    assert_eq!(graph.output_spec.height, 1080);
    assert_eq!(graph.output_spec.fps, 30);

    let mut stages = Vec::new();
    while let Ok(update) = progress.recv().await {
        stages.push(update.stage);
    }
    assert_eq!(stages.first().map(String::as_str), Some("compiling"));
    assert!(stages.iter().any(|s| s == "encoding"));
    assert_eq!(stages.last().map(String::as_str), Some("finalizing"));
}

#[tokio::test]
async fn test_overlap_rejected_before_queueing() {
    let harness = Harness::new(Behaviour::Succeed);
    let timeline = Timeline::new(
        vec![Track::new("video", TrackKind::Video, "Main")
            .with_clip(Clip::new(
                "a",
                0.0,
                5.0,
                ClipContent::new("https://cdn.test/a.mp4", ContentKind::Video),
            ))
            .with_clip(Clip::new(
                "b",
                4.0,
                5.0,
                ClipContent::new("https://cdn.test/b.mp4", ContentKind::Video),
            ))],
        TimelineSettings::default(),
    );

    let err = harness
        .service
        .submit_render(RenderJob::new(timeline))
        .await
        .unwrap_err();
    match err {
        WorkerError::Validation(errors) => assert_eq!(
            errors,
            vec![ValidationError::Overlap {
                track_name: "Main".to_string(),
                clip_a: "a".to_string(),
                clip_b: "b".to_string(),
            }]
        ),
        other => panic!("unexpected error {other}"),
    }

    let stats = harness.service.stats().await.unwrap();
    assert_eq!(stats.pending + stats.processing + stats.completed + stats.failed, 0);
    assert_eq!(harness.encoder.calls(), 0);
}

#[tokio::test]
async fn test_retry_then_fail() {
    let harness = Harness::new(Behaviour::Fail);
    let id = harness
        .service
        .submit_render(RenderJob::new(happy_timeline()))
        .await
        .unwrap();

    harness.queue().run_until_idle().await.unwrap();

    let job = harness.service.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert!(job.error.as_deref().unwrap_or_default().starts_with("Encode error:"));
    assert_eq!(harness.encoder.calls(), 3);
}

#[tokio::test]
async fn test_encoder_deadline_retries_then_fails_as_timeout() {
    let harness = Harness::new(Behaviour::TimeOut);
    let id = harness
        .service
        .submit_render(RenderJob::new(happy_timeline()))
        .await
        .unwrap();

    harness.queue().run_until_idle().await.unwrap();

    let job = harness.service.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert_eq!(job.error.as_deref(), Some(TIMEOUT_ERROR));
    assert_eq!(harness.encoder.calls(), 3);
}

#[tokio::test]
async fn test_compile_error_in_worker_is_not_retried() {
    let harness = Harness::new(Behaviour::Succeed);
    let timeline = Timeline::new(
        vec![Track::new("holo", TrackKind::Unknown("hologram".to_string()), "Holo")
            .with_clip(Clip::new(
                "h",
                0.0,
                2.0,
                ClipContent::new("https://cdn.test/h.bin", ContentKind::Video),
            ))],
        TimelineSettings::default(),
    );

    assert!(matches!(
        harness.service.submit_render(RenderJob::new(timeline.clone())).await,
        Err(WorkerError::Compile(_))
    ));

    // Bypass the facade so the worker sees the timeline.
    let id = harness
        .queue()
        .submit(Job::render(RenderJob::new(timeline)))
        .await
        .unwrap();
    harness.queue().run_until_idle().await.unwrap();

    let job = harness.service.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.error.as_deref().unwrap_or_default().starts_with("Compile error:"));
    assert_eq!(harness.encoder.calls(), 0);
}

#[tokio::test]
async fn test_cancel_pending_render() {
    let harness = Harness::new(Behaviour::Succeed);
    let id = harness
        .service
        .submit_render(RenderJob::new(happy_timeline()))
        .await
        .unwrap();

    assert!(harness.service.cancel(&id).await.unwrap());
    harness.queue().run_until_idle().await.unwrap();

    let job = harness.service.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(CANCELLED_ERROR));
    assert_eq!(harness.encoder.calls(), 0);
}

#[tokio::test]
async fn test_cancel_processing_render() {
    let harness = Harness::new(Behaviour::WaitForCancel);
    let id = harness
        .service
        .submit_render(RenderJob::new(happy_timeline()))
        .await
        .unwrap();

    let runner = tokio::spawn({
        let queue = harness.queue().clone();
        async move { queue.run_until_idle().await }
    });

    wait_for_status(harness.queue(), &id, JobStatus::Processing).await;
    assert!(!harness.service.cancel(&id).await.unwrap());
    runner.await.unwrap().unwrap();

    let job = harness.service.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(CANCELLED_ERROR));
    assert_eq!(job.attempts, 1);
}

#[tokio::test]
async fn test_batch_renders_every_timeline() {
    let harness = Harness::new(Behaviour::Succeed);
    let id = harness
        .service
        .submit_batch(BatchJob::new(vec![happy_timeline(), happy_timeline()]))
        .await
        .unwrap();

    harness.queue().run_until_idle().await.unwrap();

    let job = harness.service.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    match job.result {
        Some(JobOutput::Batch(artifacts)) => {
            assert_eq!(artifacts.len(), 2);
            let paths: Vec<PathBuf> = artifacts.iter().map(|a| PathBuf::from(&a.path)).collect();
            assert!(paths[0].ends_with(format!("{id}-0.mp4")));
            assert!(paths[1].ends_with(format!("{id}-1.mp4")));
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(harness.encoder.calls(), 2);
}

#[tokio::test]
async fn test_ancillary_without_runner_fails_permanently() {
    let harness = Harness::new(Behaviour::Succeed);
    let id = harness
        .service
        .submit_ancillary(AncillaryTask::Tts {
            text: "Welcome".to_string(),
            voice: "en-US".to_string(),
        })
        .await
        .unwrap();

    harness.queue().run_until_idle().await.unwrap();

    let job = harness.service.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.error.as_deref().unwrap_or_default().contains("tts"));
}

#[tokio::test]
async fn test_submit_saved_project() {
    let harness = Harness::new(Behaviour::Succeed);
    harness
        .service
        .submit_render(RenderJob::new(happy_timeline()).with_project("launch"))
        .await
        .unwrap();

    let id = harness
        .service
        .submit_project("launch", Default::default())
        .await
        .unwrap();
    assert!(matches!(
        harness.service.submit_project("missing", Default::default()).await,
        Err(WorkerError::TimelineNotFound(_))
    ));

    harness.queue().run_until_idle().await.unwrap();
    assert_eq!(
        harness.service.status(&id).await.unwrap().status,
        JobStatus::Completed
    );
}

#[test]
fn test_estimates_grow_with_content() {
    let harness = Harness::new(Behaviour::Succeed);
    let small = harness.service.estimate(&happy_timeline());

    let mut bigger = happy_timeline();
    bigger.tracks.push(
        Track::new("overlay", TrackKind::Image, "Logo").with_clip(Clip::new(
            "logo",
            0.0,
            30.0,
            ClipContent::new("https://cdn.test/logo.png", ContentKind::Image),
        )),
    );
    bigger.total_duration = 30.0;
    let large = harness.service.estimate(&bigger);

    assert!(small.render_seconds > 0.0);
    assert!(large.render_seconds >= small.render_seconds);
    assert!(large.output_size_bytes >= small.output_size_bytes);
}
