//! Error types
//!
//! One crate-level [`Error`] covers source resolution, media parsing and
//! consumer sessions. Registry failures keep their own type and are lifted
//! in through `From`.

use std::time::Duration;

use thiserror::Error;

use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    /// Locator did not split into 1 or 3 whitespace tokens, or the address
    /// itself could not be parsed
    #[error("malformed locator: {0}")]
    MalformedLocator(String),

    /// No resolver is registered for the locator scheme
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// Upstream answered with a non-2xx status; carries the status line
    #[error("{0}")]
    UpstreamStatus(String),

    /// HTTP client failure (connect, TLS, body)
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// Raw TCP dial failed
    #[error("dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Raw TCP dial did not complete in time
    #[error("dial {addr}: timed out after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    /// FLV file header rejected
    #[error("flv handshake: {0}")]
    Handshake(String),

    /// FLV track description failed
    #[error("flv describe: {0}")]
    Describe(String),

    /// Probe did not receive enough bytes before its deadline
    #[error("probe: timed out after {0:?}")]
    ProbeTimeout(Duration),

    /// Source closed before the probe had enough bytes
    #[error("probe: need {needed} bytes, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Leading bytes match no known container or bitstream
    #[error("probe: unrecognized signature {0:02x?}")]
    UnrecognizedSignature(Vec<u8>),

    /// Stream registry refused the operation
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Writing to the client failed; the session must stop
    #[error("client write: {0}")]
    ClientWrite(String),

    /// The initialization segment could not be built
    #[error("init segment: {0}")]
    InitSegment(String),

    /// The stream went away before the consumer got what it waited for
    #[error("stream closed: {0}")]
    StreamClosed(String),

    /// Media payload parsing failed
    #[error(transparent)]
    Media(#[from] MediaError),

    /// I/O error
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Media parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("invalid AVC packet")]
    InvalidAvcPacket,

    #[error("invalid AAC packet")]
    InvalidAacPacket,

    #[error("invalid FLV tag: {0}")]
    InvalidFlvTag(String),
}

impl Error {
    /// Whether this error means the requested stream does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Registry(RegistryError::StreamNotFound(_)))
    }
}
