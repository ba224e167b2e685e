//! FLV file framing
//!
//! An FLV byte stream starts with a 9-byte file header followed by a
//! back-pointer of zero, then a sequence of tags each followed by the size
//! of the tag that precedes it:
//!
//! ```text
//! +-----+-----+-----+---------+-------+------------+------------------+
//! | 'F' | 'L' | 'V' | Version | Flags | HeaderSize | PrevTagSize0 (4) |
//! +-----+-----+-----+---------+-------+------------+------------------+
//!
//! Tag:
//! +--------+-------------+-----------+-------------+---------+-------------+
//! | Type(1)| DataSize(3) | TS(3+1)   | StreamID(3) | Data(N) | PrevSize(4) |
//! +--------+-------------+-----------+-------------+---------+-------------+
//! ```
//!
//! Video data begins with `FrameType(4 bits) | CodecID(4 bits)`, audio data
//! with `SoundFormat(4 bits) | Rate(2) | Size(1) | Type(1)`.

use bytes::Bytes;

use crate::error::MediaError;

/// File signature
pub const FLV_SIGNATURE: &[u8; 3] = b"FLV";

/// Size of the file header including the first back-pointer
pub const FILE_HEADER_SIZE: usize = 9 + 4;

/// Size of a tag header
pub const TAG_HEADER_SIZE: usize = 11;

/// Size of the back-pointer after each tag
pub const PREV_TAG_SIZE: usize = 4;

/// Parsed FLV file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    pub version: u8,
    pub has_audio: bool,
    pub has_video: bool,
}

impl FlvHeader {
    /// Parse the file header and its trailing back-pointer
    pub fn parse(data: &[u8; FILE_HEADER_SIZE]) -> Result<Self, MediaError> {
        if &data[0..3] != FLV_SIGNATURE {
            return Err(MediaError::InvalidFlvTag(format!(
                "bad signature {:02x?}",
                &data[0..3]
            )));
        }

        let header_size = u32::from_be_bytes([data[5], data[6], data[7], data[8]]);
        if header_size != 9 {
            return Err(MediaError::InvalidFlvTag(format!(
                "unexpected header size {}",
                header_size
            )));
        }

        let flags = data[4];
        Ok(Self {
            version: data[3],
            has_audio: flags & 0x04 != 0,
            has_video: flags & 0x01 != 0,
        })
    }
}

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
    Script,
}

impl FlvTagType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            8 => Some(FlvTagType::Audio),
            9 => Some(FlvTagType::Video),
            18 => Some(FlvTagType::Script),
            _ => None,
        }
    }
}

/// Decoded tag header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    /// Raw type byte, `None` when unknown
    pub tag_type: Option<FlvTagType>,
    pub data_size: usize,
    pub timestamp: u32,
}

impl TagHeader {
    pub fn parse(data: &[u8; TAG_HEADER_SIZE]) -> Self {
        let data_size = u32::from_be_bytes([0, data[1], data[2], data[3]]) as usize;
        // Lower 24 bits, then the extended byte as the top 8
        let timestamp = u32::from_be_bytes([data[7], data[4], data[5], data[6]]);

        Self {
            tag_type: FlvTagType::from_byte(data[0]),
            data_size,
            timestamp,
        }
    }
}

/// Parsed FLV tag
#[derive(Debug, Clone)]
pub struct FlvTag {
    pub tag_type: FlvTagType,
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Tag body including codec headers
    pub data: Bytes,
}

/// Video codec ID (lower 4 bits of the first video byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Avc,
    /// Enhanced-FLV legacy id 12
    Hevc,
    Other(u8),
}

impl From<u8> for VideoCodec {
    fn from(b: u8) -> Self {
        match b & 0x0F {
            7 => VideoCodec::Avc,
            12 => VideoCodec::Hevc,
            id => VideoCodec::Other(id),
        }
    }
}

/// Sound format (upper 4 bits of the first audio byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Aac,
    Other(u8),
}

impl From<u8> for AudioFormat {
    fn from(b: u8) -> Self {
        match b >> 4 {
            10 => AudioFormat::Aac,
            id => AudioFormat::Other(id),
        }
    }
}

impl FlvTag {
    pub fn new(tag_type: FlvTagType, timestamp: u32, data: Bytes) -> Self {
        Self {
            tag_type,
            timestamp,
            data,
        }
    }

    pub fn is_video(&self) -> bool {
        self.tag_type == FlvTagType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.tag_type == FlvTagType::Audio
    }

    pub fn video_codec(&self) -> Option<VideoCodec> {
        self.data
            .first()
            .filter(|_| self.is_video())
            .map(|&b| VideoCodec::from(b))
    }

    pub fn audio_format(&self) -> Option<AudioFormat> {
        self.data
            .first()
            .filter(|_| self.is_audio())
            .map(|&b| AudioFormat::from(b))
    }

    /// Frame type 1 (keyframe) or 4 (generated keyframe)
    pub fn is_keyframe(&self) -> bool {
        self.is_video() && matches!(self.data.first().map(|b| b >> 4), Some(1) | Some(4))
    }

    /// AVC packet type 0 carries the AVCDecoderConfigurationRecord
    pub fn is_avc_sequence_header(&self) -> bool {
        self.data.len() >= 2
            && self.video_codec() == Some(VideoCodec::Avc)
            && self.data[1] == 0
    }

    /// AAC packet type 0 carries the AudioSpecificConfig
    pub fn is_aac_sequence_header(&self) -> bool {
        self.data.len() >= 2 && self.audio_format() == Some(AudioFormat::Aac) && self.data[1] == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_header() {
        let data = *b"FLV\x01\x05\x00\x00\x00\x09\x00\x00\x00\x00";
        let header = FlvHeader::parse(&data).unwrap();
        assert_eq!(header.version, 1);
        assert!(header.has_audio);
        assert!(header.has_video);
    }

    #[test]
    fn test_reject_bad_signature() {
        let data = *b"GIF\x01\x05\x00\x00\x00\x09\x00\x00\x00\x00";
        assert!(FlvHeader::parse(&data).is_err());
    }

    #[test]
    fn test_reject_bad_header_size() {
        let data = *b"FLV\x01\x01\x00\x00\x00\x0A\x00\x00\x00\x00";
        assert!(FlvHeader::parse(&data).is_err());
    }

    #[test]
    fn test_tag_header() {
        // Video tag, 0x000102 bytes, timestamp 0x01020304 (extended byte 0x01)
        let data = [0x09, 0x00, 0x01, 0x02, 0x02, 0x03, 0x04, 0x01, 0x00, 0x00, 0x00];
        let header = TagHeader::parse(&data);
        assert_eq!(header.tag_type, Some(FlvTagType::Video));
        assert_eq!(header.data_size, 0x0102);
        assert_eq!(header.timestamp, 0x0102_0304);
    }

    #[test]
    fn test_unknown_tag_type() {
        let data = [0x07, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(TagHeader::parse(&data).tag_type, None);
    }

    #[test]
    fn test_avc_sequence_header() {
        let header = FlvTag::new(FlvTagType::Video, 0, Bytes::from_static(&[0x17, 0x00, 0, 0, 0]));
        assert!(header.is_avc_sequence_header());
        assert!(header.is_keyframe());

        let frame = FlvTag::new(FlvTagType::Video, 0, Bytes::from_static(&[0x27, 0x01, 0, 0, 0]));
        assert!(!frame.is_avc_sequence_header());
        assert!(!frame.is_keyframe());
    }

    #[test]
    fn test_aac_sequence_header() {
        let header = FlvTag::new(FlvTagType::Audio, 0, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]));
        assert!(header.is_aac_sequence_header());

        let mp3 = FlvTag::new(FlvTagType::Audio, 0, Bytes::from_static(&[0x2F, 0x00]));
        assert_eq!(mp3.audio_format(), Some(AudioFormat::Other(2)));
        assert!(!mp3.is_aac_sequence_header());
    }

    #[test]
    fn test_empty_data() {
        let tag = FlvTag::new(FlvTagType::Video, 0, Bytes::new());
        assert!(tag.video_codec().is_none());
        assert!(!tag.is_keyframe());
        assert!(!tag.is_avc_sequence_header());
    }
}
