//! Source resolution
//!
//! Turns a locator into a typed [`Producer`]:
//!
//! ```text
//! locator ──► Locator::parse ──► Sniffer::resolve
//!                                   ├─ http/https/httpx ─► GET ─► Content-Type table
//!                                   │                        ├─ image/jpeg, multipart ─► MjpegClient
//!                                   │                        ├─ video/x-flv ─► FlvClient (accept + describe)
//!                                   │                        └─ other ─► ProbeClient
//!                                   └─ tcp ─► dial ─► ProbeClient
//! ```

pub mod flv;
pub mod locator;
pub mod mjpeg;
pub mod probe;
pub mod sniffer;

use tokio::io::AsyncRead;

use crate::media::Media;

pub use flv::FlvClient;
pub use locator::Locator;
pub use mjpeg::MjpegClient;
pub use probe::{ProbeClient, ProbeFormat, ProbeOptions};
pub use sniffer::{ContentKind, Sniffer, SnifferConfig};

/// Owned upstream byte stream (HTTP body or TCP socket)
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// A resolved media producer
#[derive(Debug)]
pub enum Producer {
    /// JPEG / multipart MJPEG body
    Mjpeg(MjpegClient),
    /// FLV container body
    Flv(FlvClient),
    /// Anything classified by magic bytes
    Probe(ProbeClient),
}

impl Producer {
    /// Human-readable description
    pub fn desc(&self) -> &str {
        match self {
            Producer::Mjpeg(_) => "MJPEG active producer",
            Producer::Flv(_) => "FLV active producer",
            Producer::Probe(client) => client.desc(),
        }
    }

    /// Address the producer was resolved from
    pub fn url(&self) -> &str {
        match self {
            Producer::Mjpeg(client) => client.url(),
            Producer::Flv(client) => client.url(),
            Producer::Probe(client) => client.url(),
        }
    }

    /// Tracks the producer announced
    pub fn medias(&self) -> &[Media] {
        match self {
            Producer::Mjpeg(client) => client.medias(),
            Producer::Flv(client) => client.medias(),
            Producer::Probe(client) => client.medias(),
        }
    }

    /// Release the upstream byte stream
    pub fn into_reader(self) -> ByteSource {
        match self {
            Producer::Mjpeg(client) => client.into_reader(),
            Producer::Flv(client) => client.into_reader(),
            Producer::Probe(client) => client.into_reader(),
        }
    }
}
