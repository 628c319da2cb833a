//! Shared data models for the vrender render pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Timelines (tracks, clips, frame settings)
//! - Job identifiers and lifecycle status
//! - Encoding configuration and quality presets
//! - Progress updates

pub mod encoding;
pub mod job;
pub mod progress;
pub mod timeline;

// Re-export common types
pub use encoding::{Container, EncodingConfig, Quality, VideoCodec};
pub use job::{JobId, JobKind, JobStatus};
pub use progress::{ProgressUpdate, RenderStage};
pub use timeline::{
    Clip, ClipContent, ContentKind, Timeline, TimelineSettings, Track, TrackKind, TIME_EPSILON,
};
