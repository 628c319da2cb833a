//! Declarative multi-track timeline.
//!
//! A timeline is pure data: an ordered list of tracks, each holding
//! non-overlapping clips, plus the output frame settings. Behaviour beyond
//! small accessors lives in the validator and compiler.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opacity value that means "unchanged".
pub const DEFAULT_OPACITY: f64 = 100.0;
/// Scale value that means "unchanged".
pub const DEFAULT_SCALE: f64 = 1.0;
/// Volume value that means "unchanged".
pub const DEFAULT_VOLUME: f64 = 100.0;

/// Tolerance used for time and property comparisons (seconds / percent).
pub const TIME_EPSILON: f64 = 1e-6;

/// Kind of a track.
///
/// Unrecognised kinds are preserved as [`TrackKind::Unknown`] so they can be
/// reported by the compiler instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TrackKind {
    Video,
    Image,
    Avatar,
    Audio,
    Text,
    Unknown(String),
}

impl TrackKind {
    pub fn as_str(&self) -> &str {
        match self {
            TrackKind::Video => "video",
            TrackKind::Image => "image",
            TrackKind::Avatar => "avatar",
            TrackKind::Audio => "audio",
            TrackKind::Text => "text",
            TrackKind::Unknown(s) => s,
        }
    }

    /// Visual tracks participate in the overlay chain.
    pub fn is_visual(&self) -> bool {
        matches!(
            self,
            TrackKind::Video | TrackKind::Image | TrackKind::Avatar | TrackKind::Text
        )
    }

    /// Audio tracks participate in the mix.
    pub fn is_audio(&self) -> bool {
        matches!(self, TrackKind::Audio)
    }
}

impl From<String> for TrackKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "video" => TrackKind::Video,
            "image" => TrackKind::Image,
            "avatar" => TrackKind::Avatar,
            "audio" => TrackKind::Audio,
            "text" => TrackKind::Text,
            _ => TrackKind::Unknown(value),
        }
    }
}

impl From<TrackKind> for String {
    fn from(kind: TrackKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of media a clip references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Image,
    Avatar,
    Audio,
    Text,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Video => "video",
            ContentKind::Image => "image",
            ContentKind::Avatar => "avatar",
            ContentKind::Audio => "audio",
            ContentKind::Text => "text",
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, ContentKind::Audio)
    }

    /// Still images need to be looped to fill the clip duration.
    pub fn is_still(&self) -> bool {
        matches!(self, ContentKind::Image | ContentKind::Text)
    }
}

/// Media reference held by a clip. The URL is opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipContent {
    pub url: String,
    pub kind: ContentKind,
}

impl ClipContent {
    pub fn new(url: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// One placed media reference within a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Placement on the timeline, in seconds
    pub start_time: f64,
    /// Length on the timeline, in seconds
    pub duration: f64,
    pub content: ClipContent,
    /// 0-100, absent means fully opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    /// Multiplier, absent means 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// 0-100, absent means unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Clip {
    pub fn new(
        id: impl Into<String>,
        start_time: f64,
        duration: f64,
        content: ClipContent,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            start_time,
            duration,
            content,
            opacity: None,
            scale: None,
            volume: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = Some(opacity);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// End of the clip on the timeline.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn effective_opacity(&self) -> f64 {
        self.opacity.unwrap_or(DEFAULT_OPACITY)
    }

    pub fn effective_scale(&self) -> f64 {
        self.scale.unwrap_or(DEFAULT_SCALE)
    }

    pub fn effective_volume(&self) -> f64 {
        self.volume.unwrap_or(DEFAULT_VOLUME)
    }

    pub fn changes_opacity(&self) -> bool {
        (self.effective_opacity() - DEFAULT_OPACITY).abs() > TIME_EPSILON
    }

    pub fn changes_scale(&self) -> bool {
        (self.effective_scale() - DEFAULT_SCALE).abs() > TIME_EPSILON
    }

    pub fn changes_volume(&self) -> bool {
        (self.effective_volume() - DEFAULT_VOLUME).abs() > TIME_EPSILON
    }
}

/// An ordered, non-overlapping sequence of clips of one media kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    #[serde(rename = "type")]
    #[schemars(with = "String")]
    pub kind: TrackKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub clips: Vec<Clip>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl Track {
    pub fn new(id: impl Into<String>, kind: TrackKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            clips: Vec::new(),
            locked: false,
            visible: true,
        }
    }

    pub fn with_clip(mut self, clip: Clip) -> Self {
        self.clips.push(clip);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Clips ordered by start time (stable for equal starts).
    pub fn sorted_clips(&self) -> Vec<&Clip> {
        let mut clips: Vec<&Clip> = self.clips.iter().collect();
        clips.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        clips
    }

    /// End of the last clip, or zero for an empty track.
    pub fn content_end(&self) -> f64 {
        self.clips
            .iter()
            .map(Clip::end_time)
            .fold(0.0, f64::max)
    }
}

/// Output frame settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Duration requested by the author; may be shorter than the content
    #[serde(default)]
    pub declared_duration: f64,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            declared_duration: 0.0,
        }
    }
}

/// Declarative description of a composed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub tracks: Vec<Track>,
    pub settings: TimelineSettings,
    pub total_duration: f64,
}

impl Timeline {
    /// Build a timeline, deriving `total_duration` from the content.
    ///
    /// Hidden tracks count toward the duration.
    pub fn new(tracks: Vec<Track>, settings: TimelineSettings) -> Self {
        let content_end = tracks.iter().map(Track::content_end).fold(0.0, f64::max);
        let total_duration = settings.declared_duration.max(content_end);
        Self {
            tracks,
            settings,
            total_duration,
        }
    }

    /// Latest clip end across every track, hidden ones included.
    pub fn content_end(&self) -> f64 {
        self.tracks
            .iter()
            .map(Track::content_end)
            .fold(0.0, f64::max)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(|t| t.clips.len()).sum()
    }

    /// Visual tracks in layering order (index 0 is the bottom layer).
    pub fn visual_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind.is_visual())
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind.is_audio())
    }

    pub fn find_clip(&self, clip_id: &str) -> Option<&Clip> {
        self.tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .find(|c| c.id == clip_id)
    }
}
