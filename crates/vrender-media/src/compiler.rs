//! Timeline to filtergraph compiler.
//!
//! Turns a validated [`Timeline`] into a [`CompiledGraph`]: per-clip trims and
//! transforms, a left fold of visual tracks into one composited stream, and
//! a single mix over every audible clip.
//!
//! The compiler is pure. Stream labels come from per-graph counters, so the
//! same timeline and encoding config always yield an identical graph.

use tracing::debug;
use vrender_models::{Clip, EncodingConfig, Timeline, Track, TrackKind};

use crate::error::{CompileError, CompileResult};
use crate::graph::{CompiledGraph, GraphInput, GraphOp, MediaType, OutputSpec, StreamRef};

/// Compiles timelines for a fixed encoding configuration.
#[derive(Debug, Clone, Default)]
pub struct FiltergraphCompiler {
    encoding: EncodingConfig,
}

impl FiltergraphCompiler {
    pub fn new(encoding: EncodingConfig) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    /// Compile a timeline into an ordered graph.
    ///
    /// Assumes the timeline passed validation, but reports any inconsistency
    /// as a [`CompileError`] instead of producing a broken graph.
    pub fn compile(&self, timeline: &Timeline) -> CompileResult<CompiledGraph> {
        check_consistency(timeline)?;

        let mut builder = GraphBuilder::default();

        let mut base: Option<StreamRef> = None;
        for track in timeline.visual_tracks().filter(|t| t.visible) {
            let Some(track_stream) = builder.visual_track(track) else {
                continue;
            };
            base = Some(match base {
                None => track_stream,
                Some(current) => builder.overlay(current, track_stream),
            });
        }

        let mut audio_refs = Vec::new();
        for track in timeline.audio_tracks().filter(|t| t.visible) {
            for clip in track.sorted_clips() {
                audio_refs.push(builder.audio_clip(clip));
            }
        }
        let audio_out = if audio_refs.is_empty() {
            None
        } else {
            Some(builder.mix(audio_refs))
        };

        if base.is_none() && audio_out.is_none() {
            return Err(CompileError::NothingToRender);
        }

        let duration = output_duration(timeline);
        let graph = CompiledGraph {
            inputs: builder.inputs,
            steps: builder.steps,
            video_out: base,
            audio_out,
            duration,
            output_spec: OutputSpec::from_parts(&timeline.settings, &self.encoding),
        };

        debug!(
            inputs = graph.inputs.len(),
            steps = graph.steps.len(),
            duration = graph.duration,
            "Compiled timeline"
        );

        Ok(graph)
    }
}

/// Reject tracks and clips the graph cannot express.
fn check_consistency(timeline: &Timeline) -> CompileResult<()> {
    for track in &timeline.tracks {
        if let TrackKind::Unknown(kind) = &track.kind {
            return Err(CompileError::UnsupportedTrackKind {
                track_id: track.id.clone(),
                kind: kind.clone(),
            });
        }

        for clip in &track.clips {
            let timing_ok = clip.start_time.is_finite()
                && clip.duration.is_finite()
                && clip.start_time >= 0.0
                && clip.duration > 0.0;
            if !timing_ok {
                return Err(CompileError::InvalidTiming {
                    clip_id: clip.id.clone(),
                    start: clip.start_time,
                    duration: clip.duration,
                });
            }

            if track.kind.is_audio() != clip.content.kind.is_audio() {
                return Err(CompileError::ContentKindMismatch {
                    track_id: track.id.clone(),
                    clip_id: clip.id.clone(),
                    track_kind: track.kind.to_string(),
                    content_kind: clip.content.kind.as_str().to_string(),
                });
            }
        }
    }
    Ok(())
}

fn output_duration(timeline: &Timeline) -> f64 {
    let content_end = timeline.content_end();
    if timeline.total_duration.is_finite() {
        timeline.total_duration.max(content_end)
    } else {
        content_end
    }
}

#[derive(Default)]
struct GraphBuilder {
    inputs: Vec<GraphInput>,
    steps: Vec<GraphOp>,
    next_video: usize,
    next_audio: usize,
}

impl GraphBuilder {
    fn video_ref(&mut self) -> StreamRef {
        let r = StreamRef::video(self.next_video);
        self.next_video += 1;
        r
    }

    fn audio_ref(&mut self) -> StreamRef {
        let r = StreamRef::audio(self.next_audio);
        self.next_audio += 1;
        r
    }

    fn add_input(&mut self, clip: &Clip) -> usize {
        let index = self.inputs.len();
        self.inputs.push(GraphInput {
            index,
            clip_id: clip.id.clone(),
            url: clip.content.url.clone(),
            kind: clip.content.kind,
            duration: clip.duration,
        });
        index
    }

    fn trim(&mut self, clip: &Clip, media: MediaType) -> StreamRef {
        let input = self.add_input(clip);
        let out = match media {
            MediaType::Video => self.video_ref(),
            MediaType::Audio => self.audio_ref(),
        };
        self.steps.push(GraphOp::Trim {
            clip_id: clip.id.clone(),
            input,
            media,
            start: clip.start_time,
            duration: clip.duration,
            out: out.clone(),
        });
        out
    }

    /// Trim plus opacity/scale for one visual clip.
    fn visual_clip(&mut self, clip: &Clip) -> StreamRef {
        let mut current = self.trim(clip, MediaType::Video);

        if clip.changes_opacity() {
            let out = self.video_ref();
            self.steps.push(GraphOp::SetOpacity {
                input: current,
                value: clip.effective_opacity(),
                out: out.clone(),
            });
            current = out;
        }
        if clip.changes_scale() {
            let out = self.video_ref();
            self.steps.push(GraphOp::SetScale {
                input: current,
                factor: clip.effective_scale(),
                out: out.clone(),
            });
            current = out;
        }
        current
    }

    /// Fold a track's clips into one stream. `None` for an empty track.
    fn visual_track(&mut self, track: &Track) -> Option<StreamRef> {
        let mut stream: Option<StreamRef> = None;
        for clip in track.sorted_clips() {
            let clip_ref = self.visual_clip(clip);
            stream = Some(match stream {
                None => clip_ref,
                Some(current) => self.overlay(current, clip_ref),
            });
        }
        stream
    }

    fn audio_clip(&mut self, clip: &Clip) -> StreamRef {
        let mut current = self.trim(clip, MediaType::Audio);
        if clip.changes_volume() {
            let out = self.audio_ref();
            self.steps.push(GraphOp::SetVolume {
                input: current,
                value: clip.effective_volume(),
                out: out.clone(),
            });
            current = out;
        }
        current
    }

    fn overlay(&mut self, base: StreamRef, overlay: StreamRef) -> StreamRef {
        let out = self.video_ref();
        self.steps.push(GraphOp::Overlay {
            base,
            overlay,
            out: out.clone(),
        });
        out
    }

    fn mix(&mut self, inputs: Vec<StreamRef>) -> StreamRef {
        let out = self.audio_ref();
        self.steps.push(GraphOp::MixAudio {
            inputs,
            out: out.clone(),
        });
        out
    }
}
