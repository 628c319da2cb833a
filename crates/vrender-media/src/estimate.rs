//! Heuristic render cost model.
//!
//! Estimates feed user-facing hints and scheduling priority only. Every term
//! is a non-negative coefficient times a non-negative count, so estimates
//! never shrink as a timeline grows.

use serde::{Deserialize, Serialize};
use vrender_models::{Quality, Timeline};

/// Tunable coefficients for [`RenderEstimator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorCoefficients {
    /// Fixed setup cost per render (seconds)
    pub base_render_secs: f64,
    /// Encoding seconds per output second at HD
    pub render_secs_per_output_sec: f64,
    /// Extra seconds per composited track per output second
    pub render_secs_per_track_sec: f64,
    /// Fixed cost per clip (input probing, decoding setup)
    pub render_secs_per_clip: f64,
    /// Output bytes per second at HD
    pub output_bytes_per_sec: f64,
    /// Container/header overhead per clip
    pub bytes_per_clip: f64,
    /// Preview size relative to the full output
    pub preview_ratio: f64,
    /// Floor applied to every size estimate
    pub min_size_bytes: f64,
}

impl Default for EstimatorCoefficients {
    fn default() -> Self {
        Self {
            base_render_secs: 5.0,
            render_secs_per_output_sec: 0.3,
            render_secs_per_track_sec: 0.05,
            render_secs_per_clip: 0.5,
            // ~4 Mbit/s
            output_bytes_per_sec: 500_000.0,
            bytes_per_clip: 16_384.0,
            preview_ratio: 0.25,
            min_size_bytes: 65_536.0,
        }
    }
}

/// Estimated cost of rendering a timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderEstimate {
    pub render_seconds: f64,
    pub preview_size_bytes: u64,
    pub output_size_bytes: u64,
}

/// Heuristic estimator for render time and output size.
#[derive(Debug, Clone)]
pub struct RenderEstimator {
    coefficients: EstimatorCoefficients,
    quality: Quality,
}

impl Default for RenderEstimator {
    fn default() -> Self {
        Self::new(EstimatorCoefficients::default())
    }
}

impl RenderEstimator {
    pub fn new(coefficients: EstimatorCoefficients) -> Self {
        Self {
            coefficients,
            quality: Quality::default(),
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Pixel count relative to HD, used to scale time and size.
    fn quality_factor(&self) -> f64 {
        let (w, h) = self.quality.resolution();
        let (hd_w, hd_h) = Quality::Hd.resolution();
        (w as f64 * h as f64) / (hd_w as f64 * hd_h as f64)
    }

    pub fn estimate(&self, timeline: &Timeline) -> RenderEstimate {
        let c = &self.coefficients;
        let duration = non_negative(timeline.total_duration.max(timeline.content_end()));
        let tracks = timeline.track_count() as f64;
        let clips = timeline.clip_count() as f64;
        let factor = self.quality_factor();

        let render_seconds = non_negative(c.base_render_secs)
            + duration * non_negative(c.render_secs_per_output_sec) * factor
            + duration * tracks * non_negative(c.render_secs_per_track_sec)
            + clips * non_negative(c.render_secs_per_clip);

        let min_size = non_negative(c.min_size_bytes).max(1.0);
        let output_size = min_size
            + duration * non_negative(c.output_bytes_per_sec) * factor
            + clips * non_negative(c.bytes_per_clip);
        let preview_size = min_size + (output_size - min_size) * non_negative(c.preview_ratio);

        RenderEstimate {
            render_seconds: render_seconds.max(f64::MIN_POSITIVE),
            preview_size_bytes: preview_size.ceil() as u64,
            output_size_bytes: output_size.ceil() as u64,
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrender_models::{Clip, ClipContent, ContentKind, TimelineSettings, Track, TrackKind};

    fn timeline(tracks: usize, clips_per_track: usize, clip_len: f64) -> Timeline {
        let tracks = (0..tracks)
            .map(|t| {
                let mut track = Track::new(format!("t{t}"), TrackKind::Video, format!("T{t}"));
                for c in 0..clips_per_track {
                    track = track.with_clip(Clip::new(
                        format!("c{t}-{c}"),
                        c as f64 * clip_len,
                        clip_len,
                        ClipContent::new("file:///x.mp4", ContentKind::Video),
                    ));
                }
                track
            })
            .collect();
        Timeline::new(tracks, TimelineSettings::default())
    }

    fn assert_not_smaller(a: &RenderEstimate, b: &RenderEstimate) {
        assert!(b.render_seconds >= a.render_seconds);
        assert!(b.preview_size_bytes >= a.preview_size_bytes);
        assert!(b.output_size_bytes >= a.output_size_bytes);
    }

    #[test]
    fn test_estimates_are_positive() {
        let estimator = RenderEstimator::default();
        for t in [timeline(0, 0, 1.0), timeline(1, 1, 0.5), timeline(3, 4, 2.0)] {
            let e = estimator.estimate(&t);
            assert!(e.render_seconds > 0.0);
            assert!(e.preview_size_bytes > 0);
            assert!(e.output_size_bytes > 0);
        }
    }

    #[test]
    fn test_monotonic_in_duration_tracks_and_clips() {
        let estimator = RenderEstimator::default();

        let base = estimator.estimate(&timeline(1, 2, 3.0));
        assert_not_smaller(&base, &estimator.estimate(&timeline(1, 2, 6.0)));
        assert_not_smaller(&base, &estimator.estimate(&timeline(2, 2, 3.0)));
        assert_not_smaller(&base, &estimator.estimate(&timeline(1, 3, 3.0)));

        let mut longer = timeline(1, 2, 3.0);
        longer.total_duration += 60.0;
        assert_not_smaller(&base, &estimator.estimate(&longer));
    }

    #[test]
    fn test_higher_quality_costs_more() {
        let t = timeline(2, 2, 5.0);
        let hd = RenderEstimator::default().estimate(&t);
        let uhd = RenderEstimator::default()
            .with_quality(Quality::Uhd4k)
            .estimate(&t);
        assert_not_smaller(&hd, &uhd);
    }
}
