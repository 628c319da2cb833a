//! Timeline validation, filtergraph compilation and FFmpeg execution.
//!
//! This crate provides:
//! - Structural validation of timelines
//! - A pure compiler from timelines to ordered render graphs
//! - A heuristic render cost estimator
//! - Translation of graphs into FFmpeg `-filter_complex` invocations
//! - Type-safe FFmpeg command building with progress parsing and cancellation

pub mod command;
pub mod compiler;
pub mod encoder;
pub mod error;
pub mod estimate;
pub mod filters;
pub mod graph;
pub mod progress;
pub mod validate;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use compiler::FiltergraphCompiler;
pub use encoder::{
    build_render_command, EncodeProgress, Encoder, FfmpegEncoder, RenderRequest, RenderedOutput,
};
pub use error::{CompileError, CompileResult, MediaError, MediaResult};
pub use estimate::{EstimatorCoefficients, RenderEstimate, RenderEstimator};
pub use filters::{build_filter_script, FilterScript};
pub use graph::{CompiledGraph, GraphInput, GraphOp, MediaType, OutputSpec, StreamRef};
pub use progress::{FfmpegProgress, ProgressCallback};
pub use validate::{validate, ValidationError};
