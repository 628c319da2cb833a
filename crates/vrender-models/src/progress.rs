//! Progress updates published while a job runs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::JobId;

/// Coarse stage of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    Queued,
    Compiling,
    Encoding,
    Finalizing,
    Generating,
}

impl RenderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::Queued => "queued",
            RenderStage::Compiling => "compiling",
            RenderStage::Encoding => "encoding",
            RenderStage::Finalizing => "finalizing",
            RenderStage::Generating => "generating",
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single progress observation for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub job_id: JobId,
    /// 0-100
    pub percent: f64,
    pub stage: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    /// Create an update, clamping `percent` into 0-100.
    pub fn new(job_id: JobId, percent: f64, stage: impl Into<String>) -> Self {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            job_id,
            percent,
            stage: stage.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_clamped() {
        let id = JobId::from_string("j");
        assert_eq!(ProgressUpdate::new(id.clone(), 140.0, "encoding").percent, 100.0);
        assert_eq!(ProgressUpdate::new(id.clone(), -3.0, "encoding").percent, 0.0);
        assert_eq!(ProgressUpdate::new(id, f64::NAN, RenderStage::Encoding.as_str()).percent, 0.0);
    }
}
