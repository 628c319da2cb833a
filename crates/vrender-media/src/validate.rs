//! Structural validation of timelines.
//!
//! Validation runs before a job exists. It never mutates the timeline and
//! collects every problem in one pass so a caller can fix the timeline at once.

use serde::Serialize;
use thiserror::Error;
use vrender_models::{Clip, Timeline, Track, TIME_EPSILON};

/// A structural problem found in a timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("timeline has no tracks")]
    EmptyTimeline,

    #[error("timeline has no clips")]
    NoContent,

    #[error("clips '{clip_a}' and '{clip_b}' overlap on track '{track_name}'")]
    Overlap {
        track_name: String,
        clip_a: String,
        clip_b: String,
    },

    #[error("clip '{clip_id}' on track '{track_name}' has invalid timing: {reason}")]
    InvalidClipTiming {
        track_name: String,
        clip_id: String,
        reason: String,
    },

    #[error("clip '{clip_id}' has {property} {value} outside the allowed range")]
    PropertyOutOfRange {
        clip_id: String,
        property: String,
        value: f64,
    },

    #[error("invalid settings: {reason}")]
    InvalidSettings { reason: String },

    #[error("total duration {total_duration}s is shorter than content ending at {content_end}s")]
    DurationTooShort { total_duration: f64, content_end: f64 },
}

/// Validate a timeline, returning every error found.
///
/// `EmptyTimeline` and `NoContent` are reported on their own since nothing
/// else is meaningful without clips.
pub fn validate(timeline: &Timeline) -> Result<(), Vec<ValidationError>> {
    if timeline.tracks.is_empty() {
        return Err(vec![ValidationError::EmptyTimeline]);
    }
    if timeline.tracks.iter().all(|t| t.clips.is_empty()) {
        return Err(vec![ValidationError::NoContent]);
    }

    let mut errors = Vec::new();

    check_settings(timeline, &mut errors);
    for track in &timeline.tracks {
        for clip in &track.clips {
            check_clip(track, clip, &mut errors);
        }
        check_overlaps(track, &mut errors);
    }
    check_duration(timeline, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_settings(timeline: &Timeline, errors: &mut Vec<ValidationError>) {
    let settings = &timeline.settings;
    if settings.width == 0 || settings.height == 0 {
        errors.push(ValidationError::InvalidSettings {
            reason: format!(
                "resolution {}x{} must be non-zero",
                settings.width, settings.height
            ),
        });
    }
    if settings.fps == 0 {
        errors.push(ValidationError::InvalidSettings {
            reason: "fps must be non-zero".to_string(),
        });
    }
}

fn has_valid_timing(clip: &Clip) -> bool {
    clip.start_time.is_finite()
        && clip.duration.is_finite()
        && clip.start_time >= 0.0
        && clip.duration > 0.0
}

fn check_clip(track: &Track, clip: &Clip, errors: &mut Vec<ValidationError>) {
    if !has_valid_timing(clip) {
        let reason = if !clip.start_time.is_finite() || !clip.duration.is_finite() {
            "start and duration must be finite"
        } else if clip.start_time < 0.0 {
            "start must not be negative"
        } else {
            "duration must be positive"
        };
        errors.push(ValidationError::InvalidClipTiming {
            track_name: track.name.clone(),
            clip_id: clip.id.clone(),
            reason: reason.to_string(),
        });
    }

    let percent_props = [("opacity", clip.opacity), ("volume", clip.volume)];
    for (property, value) in percent_props {
        if let Some(value) = value {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                errors.push(ValidationError::PropertyOutOfRange {
                    clip_id: clip.id.clone(),
                    property: property.to_string(),
                    value,
                });
            }
        }
    }
    if let Some(scale) = clip.scale {
        if !scale.is_finite() || scale <= 0.0 {
            errors.push(ValidationError::PropertyOutOfRange {
                clip_id: clip.id.clone(),
                property: "scale".to_string(),
                value: scale,
            });
        }
    }
}

/// Report every pair of clips whose time ranges intersect.
fn check_overlaps(track: &Track, errors: &mut Vec<ValidationError>) {
    let clips: Vec<&Clip> = track
        .sorted_clips()
        .into_iter()
        .filter(|c| has_valid_timing(c))
        .collect();

    for (i, a) in clips.iter().enumerate() {
        for b in &clips[i + 1..] {
            // Sorted by start, so once b starts after a ends nothing later can overlap a.
            if a.end_time() <= b.start_time + TIME_EPSILON {
                break;
            }
            errors.push(ValidationError::Overlap {
                track_name: track.name.clone(),
                clip_a: a.id.clone(),
                clip_b: b.id.clone(),
            });
        }
    }
}

fn check_duration(timeline: &Timeline, errors: &mut Vec<ValidationError>) {
    let content_end = timeline.content_end();
    if !content_end.is_finite() {
        return;
    }
    if timeline.total_duration + TIME_EPSILON < content_end {
        errors.push(ValidationError::DurationTooShort {
            total_duration: timeline.total_duration,
            content_end,
        });
    }
}
