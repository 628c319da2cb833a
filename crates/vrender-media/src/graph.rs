//! Compiled render graph.
//!
//! The compiler emits a flat, ordered list of operations over labelled
//! streams. Each operation reads streams produced earlier in the list, so a
//! consumer can translate the steps in order without sorting.

use serde::{Deserialize, Serialize};
use std::fmt;
use vrender_models::{Container, ContentKind, EncodingConfig, TimelineSettings, VideoCodec};

/// Label of an intermediate stream in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamRef(pub String);

impl StreamRef {
    pub fn video(n: usize) -> Self {
        Self(format!("v{n}"))
    }

    pub fn audio(n: usize) -> Self {
        Self(format!("a{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// Which elementary stream of an input an operation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
}

/// One source media file referenced by the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphInput {
    /// Position in the encoder's input list
    pub index: usize,
    pub clip_id: String,
    pub url: String,
    pub kind: ContentKind,
    /// Seconds of media the clip consumes
    pub duration: f64,
}

/// A single graph-construction step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphOp {
    /// Cut `duration` seconds from an input and place it at `start` on the timeline.
    Trim {
        clip_id: String,
        input: usize,
        media: MediaType,
        start: f64,
        duration: f64,
        out: StreamRef,
    },
    SetOpacity {
        input: StreamRef,
        /// 0-100
        value: f64,
        out: StreamRef,
    },
    SetScale {
        input: StreamRef,
        factor: f64,
        out: StreamRef,
    },
    SetVolume {
        input: StreamRef,
        /// 0-100
        value: f64,
        out: StreamRef,
    },
    /// Composite `overlay` on top of `base`.
    Overlay {
        base: StreamRef,
        overlay: StreamRef,
        out: StreamRef,
    },
    /// Mix every input, lasting as long as the longest one.
    MixAudio { inputs: Vec<StreamRef>, out: StreamRef },
}

impl GraphOp {
    /// Stream produced by this step.
    pub fn output(&self) -> &StreamRef {
        match self {
            GraphOp::Trim { out, .. }
            | GraphOp::SetOpacity { out, .. }
            | GraphOp::SetScale { out, .. }
            | GraphOp::SetVolume { out, .. }
            | GraphOp::Overlay { out, .. }
            | GraphOp::MixAudio { out, .. } => out,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GraphOp::Trim { .. } => "trim",
            GraphOp::SetOpacity { .. } => "set_opacity",
            GraphOp::SetScale { .. } => "set_scale",
            GraphOp::SetVolume { .. } => "set_volume",
            GraphOp::Overlay { .. } => "overlay",
            GraphOp::MixAudio { .. } => "mix_audio",
        }
    }
}

/// Encoder invocation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: VideoCodec,
    pub audio_codec: String,
    pub container: Container,
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
    pub sample_rate: u32,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl OutputSpec {
    /// Frame settings from the timeline, codec choices from the caller.
    pub fn from_parts(settings: &TimelineSettings, encoding: &EncodingConfig) -> Self {
        Self {
            width: settings.width,
            height: settings.height,
            fps: settings.fps,
            codec: encoding.codec,
            audio_codec: encoding.effective_audio_codec(),
            container: encoding.container,
            crf: encoding.effective_crf(),
            preset: encoding.preset.clone(),
            audio_bitrate: encoding.audio_bitrate.clone(),
            sample_rate: encoding.sample_rate,
            extra_args: encoding.extra_args.clone(),
        }
    }
}

/// Output of the filtergraph compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledGraph {
    pub inputs: Vec<GraphInput>,
    pub steps: Vec<GraphOp>,
    /// Final composited video stream, absent for audio-only renders
    pub video_out: Option<StreamRef>,
    /// Final mixed audio stream, absent when nothing is audible
    pub audio_out: Option<StreamRef>,
    /// Length of the output in seconds
    pub duration: f64,
    pub output_spec: OutputSpec,
}

impl CompiledGraph {
    /// Steps of one kind, in emission order.
    pub fn ops_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a GraphOp> + 'a {
        self.steps.iter().filter(move |op| op.name() == name)
    }

    pub fn has_video(&self) -> bool {
        self.video_out.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_out.is_some()
    }
}
