//! Error types for the relay control plane

/// Result type alias using the relay Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in relay control plane operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The media engine failed to create or drive an endpoint
    #[error("Media engine error: {0}")]
    MediaEngineError(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// Operation on a relay leg that is already closed
    #[error("Peer closed: {0}")]
    PeerClosed(String),

    /// Invalid wire payload
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable
    ///
    /// Relay legs never reconnect on their own; a retryable error only tells the
    /// caller that a fresh client-initiated registration may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::MediaEngineError(_))
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error is a peer-related error
    pub fn is_peer_error(&self) -> bool {
        matches!(self, Error::PeerClosed(_) | Error::SdpError(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}
