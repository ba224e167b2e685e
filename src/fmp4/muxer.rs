//! Fragmented MP4 muxer
//!
//! Produces one init segment (`ftyp` + `moov`) for the negotiated tracks and
//! one `moof` + `mdat` pair per sample. Decode times are rebased so every
//! track starts at zero.

use bytes::{Bytes, BytesMut};

use super::boxes::{self, FragmentSample, TrackInfo};
use crate::error::{Error, Result};
use crate::media::{Codec, Media, MediaKind, Sample};

/// Audio frame length used when a duration cannot be derived
const DEFAULT_AUDIO_DURATION: u32 = 1024;

/// Assumed frame rate when a video duration cannot be derived
const DEFAULT_FRAME_RATE: u32 = 30;

#[derive(Debug)]
struct TrackState {
    media: Media,
    first_timestamp: Option<u64>,
    last_timestamp: Option<u64>,
    last_duration: u32,
}

impl TrackState {
    fn new(media: Media) -> Self {
        Self {
            media,
            first_timestamp: None,
            last_timestamp: None,
            last_duration: 0,
        }
    }

    fn default_duration(&self) -> u32 {
        match self.media.kind() {
            MediaKind::Video => self.media.clock_rate / DEFAULT_FRAME_RATE,
            MediaKind::Audio => DEFAULT_AUDIO_DURATION,
        }
    }

    /// Explicit duration, else the gap to the previous sample, else the
    /// previous duration or a per-kind default
    fn duration_for(&self, sample: &Sample) -> u32 {
        if sample.duration > 0 {
            return sample.duration;
        }
        if let Some(last) = self.last_timestamp {
            if sample.timestamp > last {
                return (sample.timestamp - last).min(u32::MAX as u64) as u32;
            }
        }
        if self.last_duration > 0 {
            self.last_duration
        } else {
            self.default_duration()
        }
    }
}

/// Fragmented MP4 muxer over a fixed track list
#[derive(Debug)]
pub struct Muxer {
    tracks: Vec<TrackState>,
    sequence: u32,
}

impl Muxer {
    /// Create a muxer; track ids are assigned in order starting at 1
    pub fn new(medias: Vec<Media>) -> Self {
        Self {
            tracks: medias.into_iter().map(TrackState::new).collect(),
            sequence: 0,
        }
    }

    /// Append a track, returning its index
    pub fn add_track(&mut self, media: Media) -> usize {
        self.tracks.push(TrackState::new(media));
        self.tracks.len() - 1
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn media(&self, track: usize) -> Option<&Media> {
        self.tracks.get(track).map(|t| &t.media)
    }

    /// Build `ftyp` + `moov`
    pub fn init_segment(&self) -> Result<BytesMut> {
        if self.tracks.is_empty() {
            return Err(Error::InitSegment("no tracks".into()));
        }
        if let Some(track) = self.tracks.iter().find(|t| t.media.codec == Codec::Jpeg) {
            return Err(Error::InitSegment(format!(
                "unsupported codec {}",
                track.media.codec
            )));
        }

        let infos: Vec<TrackInfo<'_>> = self
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| TrackInfo {
                id: i as u32 + 1,
                media: &t.media,
            })
            .collect();

        let mut buf = BytesMut::with_capacity(1024);
        boxes::write_ftyp(&mut buf);
        boxes::write_moov(&mut buf, &infos);
        Ok(buf)
    }

    /// Mux one sample for the track at `track` (index into the track list)
    pub fn fragment(&mut self, track: usize, sample: &Sample) -> Option<Bytes> {
        let state = self.tracks.get_mut(track)?;

        let duration = state.duration_for(sample);
        let first = *state.first_timestamp.get_or_insert(sample.timestamp);
        state.last_timestamp = Some(sample.timestamp);
        state.last_duration = duration;

        self.sequence = self.sequence.wrapping_add(1);

        let keyframe = match state.media.kind() {
            MediaKind::Video => sample.keyframe,
            MediaKind::Audio => true,
        };

        let mut buf = BytesMut::with_capacity(sample.data.len() + 128);
        boxes::write_fragment(
            &mut buf,
            FragmentSample {
                track_id: track as u32 + 1,
                sequence: self.sequence,
                decode_time: sample.timestamp.saturating_sub(first),
                duration,
                keyframe,
            },
            &sample.data,
        );
        Some(buf.freeze())
    }

    /// MIME type with RFC 6381 codec strings
    pub fn mime_type(&self) -> String {
        let codecs: Vec<String> = self
            .tracks
            .iter()
            .filter_map(|t| t.media.codec_string())
            .collect();

        if codecs.is_empty() {
            "video/mp4".to_string()
        } else {
            format!("video/mp4; codecs=\"{}\"", codecs.join(","))
        }
    }
}
