//! Image-stream adapter
//!
//! Wraps an open `image/jpeg` or `multipart/x-mixed-replace` response body.
//! Frames are not split here; the adapter announces one JPEG track.

use bytes::Bytes;

use super::ByteSource;
use crate::media::{Codec, Media};

/// Motion JPEG producer over an HTTP body
pub struct MjpegClient {
    url: String,
    content_type: Option<String>,
    medias: Vec<Media>,
    reader: ByteSource,
}

impl MjpegClient {
    pub fn new(reader: ByteSource, url: impl Into<String>, content_type: Option<String>) -> Self {
        Self {
            url: url.into(),
            content_type,
            medias: vec![Media::video(Codec::Jpeg, Bytes::new(), 0, 0)],
            reader,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Normalized content type the upstream declared
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Whether frames arrive as multipart parts rather than one image
    pub fn is_multipart(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("multipart/"))
    }

    pub fn medias(&self) -> &[Media] {
        &self.medias
    }

    pub fn into_reader(self) -> ByteSource {
        self.reader
    }
}

impl std::fmt::Debug for MjpegClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MjpegClient")
            .field("url", &self.url)
            .field("content_type", &self.content_type)
            .finish()
    }
}
