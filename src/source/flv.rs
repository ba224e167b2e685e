//! FLV-over-HTTP adapter
//!
//! [`FlvClient::accept`] validates the file header; [`FlvClient::describe`]
//! reads tags until every announced track has its sequence header. The two
//! steps fail independently with [`Error::Handshake`] and
//! [`Error::Describe`].

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use super::ByteSource;
use crate::error::{Error, MediaError, Result};
use crate::media::flv::{
    AudioFormat, FlvHeader, TagHeader, VideoCodec, FILE_HEADER_SIZE, PREV_TAG_SIZE,
    TAG_HEADER_SIZE,
};
use crate::media::{AudioSpecificConfig, AvcConfig, Codec, FlvTag, Media};

/// Tags larger than this are treated as corrupt
const MAX_TAG_SIZE: usize = 16 * 1024 * 1024;

/// Legacy FLV container producer
pub struct FlvClient {
    url: String,
    header: FlvHeader,
    medias: Vec<Media>,
    reader: ByteSource,
}

impl FlvClient {
    /// Read and validate the 13-byte file header
    pub async fn accept(mut reader: ByteSource, url: impl Into<String>) -> Result<Self> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| Error::Handshake(e.to_string()))?;

        let header = FlvHeader::parse(&buf).map_err(|e| Error::Handshake(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            header,
            medias: Vec::new(),
            reader,
        })
    }

    /// Read up to `tag_limit` tags until the announced tracks are described
    pub async fn describe(&mut self, tag_limit: usize) -> Result<()> {
        let mut want_video = self.header.has_video;
        let mut want_audio = self.header.has_audio;
        let mut video = None;
        let mut audio = None;

        let mut seen = 0;
        while want_video || want_audio {
            if seen >= tag_limit {
                return Err(Error::Describe(format!(
                    "no sequence headers within {} tags",
                    tag_limit
                )));
            }
            seen += 1;

            let tag = self
                .read_tag()
                .await
                .map_err(|e| Error::Describe(e.to_string()))?
                .ok_or_else(|| Error::Describe("stream ended before tracks were described".into()))?;

            if want_video && tag.is_video() {
                if tag.is_avc_sequence_header() {
                    video = Some(avc_media(&tag)?);
                    want_video = false;
                } else if tag.video_codec().is_some_and(|c| c != VideoCodec::Avc) {
                    tracing::warn!(codec = ?tag.video_codec(), "Unsupported FLV video codec");
                    want_video = false;
                }
            } else if want_audio && tag.is_audio() {
                if tag.is_aac_sequence_header() {
                    audio = Some(aac_media(&tag)?);
                    want_audio = false;
                } else if tag.audio_format() != Some(AudioFormat::Aac) {
                    tracing::warn!(format = ?tag.audio_format(), "Unsupported FLV audio format");
                    want_audio = false;
                }
            }
        }

        self.medias = video.into_iter().chain(audio).collect();
        tracing::debug!(url = %self.url, tracks = self.medias.len(), tags = seen, "FLV described");
        Ok(())
    }

    /// Read the next tag, `None` at end of stream. Unknown tag types are
    /// skipped.
    pub async fn read_tag(&mut self) -> Result<Option<FlvTag>> {
        loop {
            let mut head = [0u8; TAG_HEADER_SIZE];
            match self.reader.read_exact(&mut head).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            let header = TagHeader::parse(&head);
            if header.data_size > MAX_TAG_SIZE {
                return Err(MediaError::InvalidFlvTag(format!(
                    "tag size {} too large",
                    header.data_size
                ))
                .into());
            }

            let mut data = vec![0u8; header.data_size];
            self.reader.read_exact(&mut data).await?;
            let mut back_pointer = [0u8; PREV_TAG_SIZE];
            self.reader.read_exact(&mut back_pointer).await?;

            if let Some(tag_type) = header.tag_type {
                return Ok(Some(FlvTag::new(tag_type, header.timestamp, Bytes::from(data))));
            }
        }
    }

    pub fn header(&self) -> &FlvHeader {
        &self.header
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn medias(&self) -> &[Media] {
        &self.medias
    }

    /// Give up the underlying byte source, positioned after the last tag read
    pub fn into_reader(self) -> ByteSource {
        self.reader
    }
}

impl std::fmt::Debug for FlvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlvClient")
            .field("url", &self.url)
            .field("header", &self.header)
            .field("medias", &self.medias)
            .finish()
    }
}

/// AVC sequence header: `FrameType|CodecID (1) | AVCPacketType (1) | CTS (3) | record`
fn avc_media(tag: &FlvTag) -> Result<Media> {
    if tag.data.len() < 5 {
        return Err(Error::Describe("short AVC sequence header".into()));
    }
    let config =
        AvcConfig::parse(tag.data.slice(5..)).map_err(|e| Error::Describe(e.to_string()))?;
    let (width, height) = config.dimensions().unwrap_or((0, 0));
    Ok(Media::video(Codec::H264, config.raw, width, height))
}

/// AAC sequence header: `SoundFormat|... (1) | AACPacketType (1) | AudioSpecificConfig`
fn aac_media(tag: &FlvTag) -> Result<Media> {
    let config = AudioSpecificConfig::parse(tag.data.slice(2..))
        .map_err(|e| Error::Describe(e.to_string()))?;
    Ok(Media::audio(
        Codec::Aac,
        config.sampling_frequency,
        config.channels(),
        config.raw,
    ))
}
