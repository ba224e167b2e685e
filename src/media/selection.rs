//! Media selection from request query parameters
//!
//! `video=` and `audio=` take a comma-separated codec list, or `all` / an
//! empty value for every codec the MP4 muxer supports. When neither key is
//! present the consumer accepts H.264/H.265 video and AAC audio. When only
//! one key is present the other kind is excluded.

use std::collections::HashMap;

use super::{Codec, Media, MediaKind};

/// Video codecs the fragmented MP4 muxer can write
pub const MP4_VIDEO_CODECS: &[Codec] = &[Codec::H264, Codec::H265];

/// Audio codecs the fragmented MP4 muxer can write
pub const MP4_AUDIO_CODECS: &[Codec] = &[Codec::Aac];

/// Accepted codecs per track kind, in preference order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSelection {
    pub video: Vec<Codec>,
    pub audio: Vec<Codec>,
}

impl MediaSelection {
    /// Every codec the MP4 muxer supports
    pub fn mp4() -> Self {
        Self {
            video: MP4_VIDEO_CODECS.to_vec(),
            audio: MP4_AUDIO_CODECS.to_vec(),
        }
    }

    /// Build a selection from parsed query parameters
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let video = query.get("video");
        let audio = query.get("audio");

        if video.is_none() && audio.is_none() {
            return Self::mp4();
        }

        Self {
            video: video
                .map(|v| parse_codecs(v, MP4_VIDEO_CODECS))
                .unwrap_or_default(),
            audio: audio
                .map(|v| parse_codecs(v, MP4_AUDIO_CODECS))
                .unwrap_or_default(),
        }
    }

    /// Drop every audio codec
    pub fn video_only(mut self) -> Self {
        self.audio.clear();
        self
    }

    /// Check whether a track may be delivered under this selection
    pub fn accepts(&self, media: &Media) -> bool {
        let codecs = match media.kind() {
            MediaKind::Video => &self.video,
            MediaKind::Audio => &self.audio,
        };
        codecs.contains(&media.codec)
    }

    pub fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty()
    }
}

impl Default for MediaSelection {
    fn default() -> Self {
        Self::mp4()
    }
}

fn parse_codecs(value: &str, supported: &[Codec]) -> Vec<Codec> {
    if value.is_empty() || value.eq_ignore_ascii_case("all") {
        return supported.to_vec();
    }

    let mut codecs = Vec::new();
    for codec in value.split(',').filter_map(Codec::from_name) {
        if supported.contains(&codec) && !codecs.contains(&codec) {
            codecs.push(codec);
        }
    }
    codecs
}
