//! Magic-byte probing
//!
//! Reads the first [`PROBE_SIZE`] bytes of a source and classifies them:
//!
//! | Signature               | Format                       |
//! |-------------------------|------------------------------|
//! | `FLV`                   | FLV (accepted and described) |
//! | `0x47`                  | MPEG-TS                      |
//! | `00 00 00 01 67`        | H.264 Annex-B                |
//! | `00 00 00 01 40`        | H.265 Annex-B                |
//! | `FF D8`                 | JPEG                         |
//! | `--`                    | multipart MJPEG              |
//! | `FF F1` / `FF F9`       | ADTS AAC                     |
//!
//! The probed bytes are replayed ahead of the rest of the source.

use std::io::Cursor;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::flv::FlvClient;
use super::ByteSource;
use crate::error::{Error, Result};
use crate::media::{AudioSpecificConfig, Codec, Media};

/// Bytes read before classification
pub const PROBE_SIZE: usize = 8;

/// Detected container or bitstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeFormat {
    Flv,
    MpegTs,
    H264,
    H265,
    Jpeg,
    Mjpeg,
    Adts,
}

impl ProbeFormat {
    /// Classify a probe buffer
    pub fn detect(head: &[u8]) -> Option<Self> {
        match head {
            [b'F', b'L', b'V', ..] => Some(ProbeFormat::Flv),
            [0x47, ..] => Some(ProbeFormat::MpegTs),
            [0, 0, 0, 1, nal, ..] if nal & 0x1F == 7 => Some(ProbeFormat::H264),
            [0, 0, 0, 1, nal, ..] if (nal >> 1) & 0x3F == 32 => Some(ProbeFormat::H265),
            [0xFF, 0xD8, ..] => Some(ProbeFormat::Jpeg),
            [b'-', b'-', ..] => Some(ProbeFormat::Mjpeg),
            [0xFF, b, ..] if b & 0xF6 == 0xF0 => Some(ProbeFormat::Adts),
            _ => None,
        }
    }
}

/// Probe tuning
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    /// Deadline for classifying the source
    pub timeout: Duration,
    /// Tag limit when a probed FLV stream is described
    pub describe_tag_limit: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            describe_tag_limit: 64,
        }
    }
}

/// Producer for a source classified by its leading bytes
pub struct ProbeClient {
    desc: String,
    url: String,
    format: ProbeFormat,
    medias: Vec<Media>,
    reader: ByteSource,
}

impl ProbeClient {
    /// Read the probe bytes and classify the source.
    ///
    /// `options.timeout` bounds the whole classification, including the
    /// FLV describe pass.
    pub async fn probe(reader: ByteSource, options: ProbeOptions) -> Result<Self> {
        tokio::time::timeout(options.timeout, Self::classify(reader, options))
            .await
            .map_err(|_| Error::ProbeTimeout(options.timeout))?
    }

    async fn classify(mut reader: ByteSource, options: ProbeOptions) -> Result<Self> {
        let mut head = [0u8; PROBE_SIZE];
        let got = read_full(&mut reader, &mut head).await?;

        if got < PROBE_SIZE {
            return Err(Error::InsufficientData {
                needed: PROBE_SIZE,
                got,
            });
        }

        let format = ProbeFormat::detect(&head)
            .ok_or_else(|| Error::UnrecognizedSignature(head.to_vec()))?;

        let prelude = Bytes::copy_from_slice(&head);
        let reader: ByteSource = Box::new(Cursor::new(prelude.clone()).chain(reader));

        let (medias, reader) = match format {
            ProbeFormat::Flv => {
                let mut flv = FlvClient::accept(reader, "").await?;
                flv.describe(options.describe_tag_limit).await?;
                let medias = flv.medias().to_vec();
                (medias, flv.into_reader())
            }
            ProbeFormat::MpegTs => (Vec::new(), reader),
            ProbeFormat::H264 => (vec![Media::video(Codec::H264, Bytes::new(), 0, 0)], reader),
            ProbeFormat::H265 => (vec![Media::video(Codec::H265, Bytes::new(), 0, 0)], reader),
            ProbeFormat::Jpeg | ProbeFormat::Mjpeg => {
                (vec![Media::video(Codec::Jpeg, Bytes::new(), 0, 0)], reader)
            }
            ProbeFormat::Adts => {
                let config = AudioSpecificConfig::from_adts(&prelude)?;
                let media = Media::audio(
                    Codec::Aac,
                    config.sampling_frequency,
                    config.channels(),
                    config.raw,
                );
                (vec![media], reader)
            }
        };

        tracing::debug!(format = ?format, tracks = medias.len(), "Source probed");

        Ok(Self {
            desc: String::new(),
            url: String::new(),
            format,
            medias,
            reader,
        })
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn format(&self) -> ProbeFormat {
        self.format
    }

    pub fn medias(&self) -> &[Media] {
        &self.medias
    }

    pub fn into_reader(self) -> ByteSource {
        self.reader
    }
}

impl std::fmt::Debug for ProbeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeClient")
            .field("desc", &self.desc)
            .field("url", &self.url)
            .field("format", &self.format)
            .field("medias", &self.medias)
            .finish()
    }
}

/// Fill `buf` unless the source ends first; returns the bytes read
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::source::flv::tests::flv_stream;

    fn source(data: &[u8]) -> ByteSource {
        Box::new(Cursor::new(data.to_vec()))
    }

    #[test]
    fn test_detect_signatures() {
        let cases: &[(&[u8], ProbeFormat)] = &[
            (b"FLV\x01\x05\0\0\0", ProbeFormat::Flv),
            (&[0x47, 0x40, 0x00, 0x10], ProbeFormat::MpegTs),
            (&[0, 0, 0, 1, 0x67, 0x42], ProbeFormat::H264),
            (&[0, 0, 0, 1, 0x40, 0x01], ProbeFormat::H265),
            (&[0xFF, 0xD8, 0xFF, 0xE0], ProbeFormat::Jpeg),
            (b"--myboundary", ProbeFormat::Mjpeg),
            (&[0xFF, 0xF1, 0x50, 0x80], ProbeFormat::Adts),
            (&[0xFF, 0xF9, 0x50, 0x80], ProbeFormat::Adts),
        ];
        for (head, format) in cases {
            assert_eq!(ProbeFormat::detect(head), Some(*format), "{head:02x?}");
        }

        // a lone sync byte is enough for MPEG-TS
        assert_eq!(ProbeFormat::detect(b"GIF89a"), Some(ProbeFormat::MpegTs));

        assert_eq!(ProbeFormat::detect(b"RIFF\x24\0\0\0WAVE"), None);
        assert_eq!(ProbeFormat::detect(&[0, 0, 1, 0xBA, 0x44]), None);
        assert_eq!(ProbeFormat::detect(&[0, 0, 0, 1, 0x68]), None);
    }

    #[tokio::test]
    async fn test_probe_replays_prelude() {
        let mut data = vec![0, 0, 0, 1, 0x67, 0x42, 0xC0, 0x0D];
        data.extend_from_slice(b"rest");

        let client = ProbeClient::probe(source(&data), ProbeOptions::default())
            .await
            .unwrap();
        assert_eq!(client.format(), ProbeFormat::H264);
        assert_eq!(client.medias()[0].codec, Codec::H264);

        let mut replay = Vec::new();
        client.into_reader().read_to_end(&mut replay).await.unwrap();
        assert_eq!(replay, data);
    }

    #[tokio::test]
    async fn test_probe_describes_flv() {
        let client = ProbeClient::probe(source(&flv_stream()), ProbeOptions::default())
            .await
            .unwrap();
        assert_eq!(client.format(), ProbeFormat::Flv);
        assert_eq!(client.medias().len(), 2);
    }

    #[tokio::test]
    async fn test_probe_adts_config() {
        let data = [0xFF, 0xF1, 0x50, 0x80, 0x2E, 0x7F, 0xFC, 0x21];
        let client = ProbeClient::probe(source(&data), ProbeOptions::default())
            .await
            .unwrap();
        let media = &client.medias()[0];
        assert_eq!(media.codec, Codec::Aac);
        assert_eq!(media.clock_rate, 44100);
        assert_eq!(&media.config[..], &[0x12, 0x10]);
    }

    #[tokio::test]
    async fn test_probe_insufficient_data() {
        let err = ProbeClient::probe(source(&[0x47, 0x40]), ProbeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientData { needed: 8, got: 2 }));
    }

    #[tokio::test]
    async fn test_probe_unrecognized() {
        let err = ProbeClient::probe(source(b"RIFF\x24\0\0\0WAVE"), ProbeOptions::default())
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::UnrecognizedSignature(ref head) if head == b"RIFF\x24\0\0\0"),
            "{err}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout() {
        let (client_side, _server_side) = tokio::io::duplex(64);
        let options = ProbeOptions {
            timeout: Duration::from_secs(5),
            ..Default::default()
        };

        let err = ProbeClient::probe(Box::new(client_side), options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProbeTimeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_covers_flv_describe() {
        let (client_side, mut server_side) = tokio::io::duplex(64);
        server_side
            .write_all(b"FLV\x01\x01\0\0\0\x09\0\0\0\0")
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let err = ProbeClient::probe(Box::new(client_side), ProbeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProbeTimeout(_)), "{err}");
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
        drop(server_side);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_slow_source_within_deadline() {
        let mock = tokio_test::io::Builder::new()
            .read(&[0xFF, 0xD8])
            .wait(Duration::from_secs(1))
            .read(&[0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46])
            .build();

        let client = ProbeClient::probe(Box::new(mock), ProbeOptions::default())
            .await
            .unwrap();
        assert_eq!(client.format(), ProbeFormat::Jpeg);
    }
}
