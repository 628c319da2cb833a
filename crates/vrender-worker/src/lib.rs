//! Render worker.
//!
//! This crate provides:
//! - The job handler compiling timelines and driving the encoder
//! - Ancillary media generation behind a runner trait
//! - A submission facade with synchronous validation
//! - Structured job logging and worker configuration

pub mod ancillary;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod service;

pub use ancillary::{AncillaryRunner, ThumbnailRunner};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::{init_tracing, JobLogger};
pub use pipeline::RenderPipeline;
pub use service::RenderService;
