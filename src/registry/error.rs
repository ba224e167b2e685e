//! Registry error types
//!
//! Error types for stream registry operations.

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Stream not found
    StreamNotFound(String),
    /// A stream with this name is already registered
    StreamAlreadyExists(String),
    /// Stream already has a producer attached
    ProducerAlreadyAttached(String),
    /// None of the stream's tracks satisfy the consumer's selection
    CodecsNotMatched { stream: String, offered: String },
    /// Consumer refused a negotiated track
    TrackRejected { stream: String, reason: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreamNotFound(_) => write!(f, "stream not found"),
            RegistryError::StreamAlreadyExists(name) => {
                write!(f, "stream already exists: {}", name)
            }
            RegistryError::ProducerAlreadyAttached(name) => {
                write!(f, "stream already has a producer: {}", name)
            }
            RegistryError::CodecsNotMatched { stream, offered } => {
                write!(f, "codecs not matched: {} offers [{}]", stream, offered)
            }
            RegistryError::TrackRejected { stream, reason } => {
                write!(f, "track rejected for {}: {}", stream, reason)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
