//! Encoder boundary and the FFmpeg-backed implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::build_filter_script;
use crate::graph::CompiledGraph;
use vrender_models::EncodingConfig;

/// Histogram of wall-clock encode time.
pub const ENCODE_DURATION_METRIC: &str = "vrender_encode_duration_seconds";

/// Receives encode progress as a 0-100 percentage.
pub type EncodeProgress = Arc<dyn Fn(f64) + Send + Sync>;

/// Where and how a graph should be rendered.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Used for log correlation and the default file name
    pub job_id: String,
    pub output_dir: PathBuf,
    pub file_stem: String,
}

impl RenderRequest {
    pub fn new(job_id: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        let job_id = job_id.into();
        Self {
            file_stem: job_id.clone(),
            job_id,
            output_dir: output_dir.into(),
        }
    }

    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = stem.into();
        self
    }

    /// Output file path for a graph, extension chosen by its container.
    pub fn output_path(&self, graph: &CompiledGraph) -> PathBuf {
        self.output_dir.join(format!(
            "{}.{}",
            self.file_stem,
            graph.output_spec.container.extension()
        ))
    }
}

/// The single artifact produced by a successful render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedOutput {
    pub path: PathBuf,
    pub duration: f64,
    pub size_bytes: u64,
}

/// Executes compiled graphs.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Render a graph to one output file.
    ///
    /// Long-running; reports progress through `on_progress` and stops early
    /// with [`MediaError::Cancelled`] once `cancel` turns true.
    async fn render(
        &self,
        graph: &CompiledGraph,
        request: &RenderRequest,
        on_progress: EncodeProgress,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<RenderedOutput>;
}

/// Build the full FFmpeg invocation for a graph.
pub fn build_render_command(
    graph: &CompiledGraph,
    output: impl Into<PathBuf>,
) -> MediaResult<FfmpegCommand> {
    let script = build_filter_script(graph)?;
    let spec = &graph.output_spec;

    let mut cmd = FfmpegCommand::new(output.into());
    for (args, url) in script.inputs {
        cmd = cmd.input_with_args(url, args);
    }
    cmd = cmd.filter_complex(script.filter_complex);
    for label in script.maps {
        cmd = cmd.map(label);
    }

    let encoding = EncodingConfig {
        codec: spec.codec,
        container: spec.container,
        preset: spec.preset.clone(),
        crf: Some(spec.crf),
        audio_codec: Some(spec.audio_codec.clone()),
        audio_bitrate: spec.audio_bitrate.clone(),
        sample_rate: spec.sample_rate,
        extra_args: spec.extra_args.clone(),
        ..Default::default()
    };

    Ok(cmd
        .output_args(encoding.to_ffmpeg_args())
        .frame_rate(spec.fps)
        .duration(graph.duration))
}

/// Encoder that shells out to the `ffmpeg` binary.
#[derive(Debug, Clone, Default)]
pub struct FfmpegEncoder {
    timeout_secs: Option<u64>,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill FFmpeg if a single render exceeds `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn render(
        &self,
        graph: &CompiledGraph,
        request: &RenderRequest,
        on_progress: EncodeProgress,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<RenderedOutput> {
        let output = request.output_path(graph);
        let cmd = build_render_command(graph, &output)?;

        tokio::fs::create_dir_all(&request.output_dir).await?;

        let mut runner = FfmpegRunner::new().with_cancel(cancel);
        if let Some(secs) = self.timeout_secs {
            runner = runner.with_timeout(secs);
        }

        info!(
            job_id = %request.job_id,
            inputs = cmd.input_count(),
            output = %output.display(),
            "Starting FFmpeg render"
        );

        let started = Instant::now();
        let total = graph.duration;
        let progress = Arc::clone(&on_progress);
        runner
            .run_with_progress(&cmd, move |p| progress(p.percentage(total)))
            .await?;

        let elapsed = started.elapsed().as_secs_f64();
        metrics::histogram!(ENCODE_DURATION_METRIC).record(elapsed);

        let metadata = tokio::fs::metadata(&output).await.map_err(|e| {
            MediaError::ffmpeg_failed(
                format!("output {} missing after render: {e}", output.display()),
                None,
                None,
            )
        })?;
        on_progress(100.0);

        debug!(job_id = %request.job_id, elapsed_secs = elapsed, "FFmpeg render finished");

        Ok(RenderedOutput {
            path: output,
            duration: graph.duration,
            size_bytes: metadata.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::FiltergraphCompiler;
    use vrender_models::{
        Clip, ClipContent, ContentKind, Quality, Timeline, TimelineSettings, Track, TrackKind,
    };

    fn graph(encoding: EncodingConfig) -> CompiledGraph {
        let timeline = Timeline::new(
            vec![
                Track::new("v", TrackKind::Video, "V").with_clip(Clip::new(
                    "a",
                    0.0,
                    4.0,
                    ClipContent::new("https://cdn.test/a.mp4", ContentKind::Video),
                )),
                Track::new("m", TrackKind::Audio, "M").with_clip(Clip::new(
                    "m",
                    0.0,
                    4.0,
                    ClipContent::new("https://cdn.test/m.mp3", ContentKind::Audio),
                )),
            ],
            TimelineSettings::default(),
        );
        FiltergraphCompiler::new(encoding).compile(&timeline).unwrap()
    }

    #[test]
    fn test_render_command_carries_output_spec() {
        let g = graph(EncodingConfig::default().with_quality(Quality::Fhd));
        let args = build_render_command(&g, "/tmp/out.mp4").unwrap().build_args();

        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"21".to_string()));
        assert!(args.contains(&"aac".to_string()));
        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 2);
        assert!(args.contains(&"4.000".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[tokio::test]
    async fn test_cancelled_render_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph(EncodingConfig::default());
        let request = RenderRequest::new("job-2", dir.path().join("renders"));
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let result = FfmpegEncoder::new()
            .render(&g, &request, Arc::new(|_: f64| {}), rx)
            .await;

        assert!(matches!(
            result,
            Err(MediaError::Cancelled) | Err(MediaError::FfmpegNotFound)
        ));
        assert!(request.output_dir.is_dir());
        assert!(!request.output_path(&g).exists());
    }

    #[test]
    fn test_output_path_uses_container_extension() {
        let g = graph(EncodingConfig::webm());
        let request = RenderRequest::new("job-1", "/renders").with_file_stem("final");
        assert_eq!(request.output_path(&g), PathBuf::from("/renders/final.webm"));
    }
}
