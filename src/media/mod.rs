//! Media description types
//!
//! This module provides:
//! - [`Media`] and [`Codec`] describing a stream's tracks
//! - [`Sample`], the unit the registry fans out to consumers
//! - [`MediaSelection`] built from request query parameters
//! - FLV tag, H.264 and AAC parsing used by the FLV adapter and codec strings

pub mod aac;
pub mod flv;
pub mod h264;
pub mod selection;

use bytes::Bytes;

pub use aac::AudioSpecificConfig;
pub use flv::{FlvTag, FlvTagType};
pub use h264::AvcConfig;
pub use selection::MediaSelection;

/// Default video clock rate (ticks per second)
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Codecs a stream can announce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// H.264 / AVC, AVCC length-prefixed samples
    H264,
    /// H.265 / HEVC, length-prefixed samples
    H265,
    /// AAC, raw frames without ADTS
    Aac,
    /// Motion JPEG
    Jpeg,
}

impl Codec {
    pub fn kind(&self) -> MediaKind {
        match self {
            Codec::H264 | Codec::H265 | Codec::Jpeg => MediaKind::Video,
            Codec::Aac => MediaKind::Audio,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::H264 => "H264",
            Codec::H265 => "H265",
            Codec::Aac => "AAC",
            Codec::Jpeg => "JPEG",
        }
    }

    /// Parse a codec name as used in query strings (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "h264" | "avc" => Some(Codec::H264),
            "h265" | "hevc" => Some(Codec::H265),
            "aac" | "mpeg4-generic" => Some(Codec::Aac),
            "jpeg" | "mjpeg" => Some(Codec::Jpeg),
            _ => None,
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One track of a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub codec: Codec,
    /// Timestamp ticks per second
    pub clock_rate: u32,
    /// Decoder configuration: avcC, hvcC or AudioSpecificConfig bytes
    pub config: Bytes,
    pub width: u32,
    pub height: u32,
    pub channels: u16,
}

impl Media {
    /// Create a video track with the default 90 kHz clock
    pub fn video(codec: Codec, config: Bytes, width: u32, height: u32) -> Self {
        Self {
            codec,
            clock_rate: VIDEO_CLOCK_RATE,
            config,
            width,
            height,
            channels: 0,
        }
    }

    /// Create an audio track clocked at its sample rate
    pub fn audio(codec: Codec, sample_rate: u32, channels: u16, config: Bytes) -> Self {
        Self {
            codec,
            clock_rate: sample_rate,
            config,
            width: 0,
            height: 0,
            channels,
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.codec.kind()
    }

    /// RFC 6381 codec string for MIME `codecs=` parameters
    pub fn codec_string(&self) -> Option<String> {
        match self.codec {
            Codec::H264 => Some(match self.config.get(1..4) {
                Some(p) => format!("avc1.{:02X}{:02X}{:02X}", p[0], p[1], p[2]),
                None => "avc1".to_string(),
            }),
            Codec::H265 => Some("hvc1.1.6.L93.B0".to_string()),
            Codec::Aac => {
                let object_type = self.config.first().map(|b| b >> 3).unwrap_or(2);
                Some(format!("mp4a.40.{}", object_type))
            }
            Codec::Jpeg => None,
        }
    }
}

/// One encoded access unit delivered by the registry
#[derive(Debug, Clone)]
pub struct Sample {
    /// Index of the track in the stream's media list
    pub media: usize,
    /// Decode timestamp in the track's clock rate
    pub timestamp: u64,
    /// Duration in clock ticks, 0 when unknown
    pub duration: u32,
    /// Whether this is a sync sample (video only)
    pub keyframe: bool,
    /// Payload (zero-copy via reference counting)
    pub data: Bytes,
}

impl Sample {
    /// Create a video sample
    pub fn video(media: usize, timestamp: u64, data: Bytes, keyframe: bool) -> Self {
        Self {
            media,
            timestamp,
            duration: 0,
            keyframe,
            data,
        }
    }

    /// Create an audio sample
    pub fn audio(media: usize, timestamp: u64, data: Bytes) -> Self {
        Self {
            media,
            timestamp,
            duration: 0,
            keyframe: false,
            data,
        }
    }

    /// Set an explicit duration
    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }
}
