//! Error types for TapShare.
//!
//! This module provides a unified error type for all engine operations,
//! with specific error variants for different failure modes. The public
//! [`PeerManager`](crate::PeerManager) façade converts these into boolean
//! outcomes; the `try_*` methods expose them directly.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// A specialized `Result` type for TapShare operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for TapShare.
#[derive(Error, Debug)]
pub enum Error {
    /// No peer answered the discovery broadcast (E001)
    #[error("session '{0}' not found on network")]
    SessionNotFound(String),

    /// The session is not registered on this host (E002)
    #[error("unknown session '{0}'")]
    UnknownSession(String),

    /// A transport operation is already bound to the session (E003)
    #[error("session '{0}' already has an active transfer")]
    SessionBusy(String),

    /// Session identifier is empty or malformed
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    /// Metadata frame names a different session (E004)
    #[error("session mismatch: expected '{expected}', got '{actual}'")]
    SessionMismatch {
        /// Session identifier requested by the receiver
        expected: String,
        /// Session identifier announced by the sender
        actual: String,
    },

    /// Could not bind a listening socket (E005)
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the bind was attempted on
        addr: SocketAddr,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Peer closed the stream before the declared length was reached (E006)
    #[error("connection closed early: {0}")]
    ConnectionClosed(String),

    /// Reconstructed file does not match the recorded digest (E007)
    #[error("checksum mismatch for '{file}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// File that failed verification
        file: String,
        /// Digest recorded by the sender
        expected: String,
        /// Digest recomputed locally
        actual: String,
    },

    /// File not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Invalid or unsafe path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Endpoint string could not be parsed
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Invalid protocol message
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// Frame length prefix exceeds the accepted maximum
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation timeout
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::SessionNotFound(_) => Some("E001"),
            Self::UnknownSession(_) => Some("E002"),
            Self::SessionBusy(_) => Some("E003"),
            Self::SessionMismatch { .. } => Some("E004"),
            Self::Bind { .. } => Some("E005"),
            Self::ConnectionClosed(_) => Some("E006"),
            Self::ChecksumMismatch { .. } => Some("E007"),
            _ => None,
        }
    }

    /// Returns whether re-running the whole operation may succeed.
    ///
    /// Nothing retries automatically; this only guides the caller.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SessionNotFound(_)
                | Self::SessionBusy(_)
                | Self::ConnectionClosed(_)
                | Self::ChecksumMismatch { .. }
                | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
