//! Video encoding configuration.
//!
//! Codec/container choices are an external input to the compiler: they are
//! never derived from the timeline, only copied into the output spec.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default encoding preset
pub const DEFAULT_PRESET: &str = "medium";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Default audio sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Output quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Sd,
    #[default]
    Hd,
    Fhd,
    #[serde(rename = "4k")]
    Uhd4k,
}

impl Quality {
    /// Frame size for this tier.
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            Quality::Sd => (854, 480),
            Quality::Hd => (1280, 720),
            Quality::Fhd => (1920, 1080),
            Quality::Uhd4k => (3840, 2160),
        }
    }
}

/// Video codec family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Vp9,
    Av1,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn encoder_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Av1 => "libaom-av1",
        }
    }

    /// Constant rate factor tuned per quality tier.
    pub fn crf_for(&self, quality: Quality) -> u8 {
        let table: [u8; 4] = match self {
            VideoCodec::H264 => [26, 23, 21, 20],
            VideoCodec::H265 => [30, 28, 26, 24],
            VideoCodec::Vp9 => [35, 32, 30, 28],
            VideoCodec::Av1 => [40, 34, 30, 28],
        };
        match quality {
            Quality::Sd => table[0],
            Quality::Hd => table[1],
            Quality::Fhd => table[2],
            Quality::Uhd4k => table[3],
        }
    }

    /// Whether the encoder is rate-controlled with `-b:v 0 -crf` (libvpx / libaom).
    pub fn uses_constrained_quality(&self) -> bool {
        matches!(self, VideoCodec::Vp9 | VideoCodec::Av1)
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Webm,
    Mov,
}

impl Container {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
            Container::Mov => "mov",
        }
    }

    /// Audio encoder compatible with the container.
    pub fn default_audio_codec(&self) -> &'static str {
        match self {
            Container::Webm => "libopus",
            Container::Mp4 | Container::Mov => "aac",
        }
    }
}

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncodingConfig {
    /// Video codec
    #[serde(default)]
    pub codec: VideoCodec,

    /// Output container
    #[serde(default)]
    pub container: Container,

    /// Quality tier (drives CRF)
    #[serde(default)]
    pub quality: Quality,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Explicit CRF override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,

    /// Explicit audio codec override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Audio sample rate
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: VideoCodec::default(),
            container: Container::default(),
            quality: Quality::default(),
            preset: DEFAULT_PRESET.to_string(),
            crf: None,
            audio_codec: None,
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// Create a new encoding configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// WebM/VP9 configuration.
    pub fn webm() -> Self {
        Self {
            codec: VideoCodec::Vp9,
            container: Container::Webm,
            preset: "good".to_string(),
            ..Default::default()
        }
    }

    pub fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Returns a new config with updated CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = Some(crf);
        self
    }

    /// CRF after applying the quality table.
    pub fn effective_crf(&self) -> u8 {
        self.crf.unwrap_or_else(|| self.codec.crf_for(self.quality))
    }

    /// Audio codec after applying the container default.
    pub fn effective_audio_codec(&self) -> String {
        self.audio_codec
            .clone()
            .unwrap_or_else(|| self.container.default_audio_codec().to_string())
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let crf = self.effective_crf().to_string();
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.encoder_name().to_string(),
        ];

        if self.codec.uses_constrained_quality() {
            args.extend(["-b:v".to_string(), "0".to_string()]);
            args.extend(["-deadline".to_string(), self.preset.clone()]);
        } else {
            args.extend(["-preset".to_string(), self.preset.clone()]);
        }
        args.extend(["-crf".to_string(), crf]);
        if self.codec == VideoCodec::Av1 {
            args.extend(["-row-mt".to_string(), "1".to_string()]);
        }

        args.extend_from_slice(&[
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            self.effective_audio_codec(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
        ]);

        if self.container == Container::Mp4 {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }

        args.extend(self.extra_args.clone());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncodingConfig::default();
        assert_eq!(config.codec.encoder_name(), "libx264");
        assert_eq!(config.effective_crf(), 23);
        assert_eq!(config.effective_audio_codec(), "aac");
    }

    #[test]
    fn test_ffmpeg_args() {
        let config = EncodingConfig::default().with_crf(18);
        let args = config.to_ffmpeg_args();
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"18".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
    }

    #[test]
    fn test_webm_uses_opus_and_constrained_quality() {
        let config = EncodingConfig::webm().with_quality(Quality::Fhd);
        let args = config.to_ffmpeg_args();
        assert!(args.contains(&"libvpx-vp9".to_string()));
        assert!(args.contains(&"libopus".to_string()));
        assert!(args.contains(&"-deadline".to_string()));
        assert_eq!(config.effective_crf(), 30);
    }

    #[test]
    fn test_quality_resolution() {
        assert_eq!(Quality::Sd.resolution(), (854, 480));
        assert_eq!(Quality::Uhd4k.resolution(), (3840, 2160));
        let parsed: Quality = serde_json::from_str("\"4k\"").unwrap();
        assert_eq!(parsed, Quality::Uhd4k);
    }
}
