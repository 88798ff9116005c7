//! File transfer for TapShare.
//!
//! A transfer is one TCP connection carrying one metadata frame followed by
//! the raw bytes of every file. The sender listens, the receiver connects.
//!
//! ## Transfer Flow
//!
//! ```text
//! Receiver                                  Sender
//!    |                                        |
//!    |  (discovery resolves the endpoint)     |
//!    |------------ TCP connect -------------->|
//!    |<-------- metadata frame (JSON) --------|
//!    |   validate session id                  |
//!    |<-------- file 1 bytes (size 1) --------|
//!    |<-------- file 2 bytes (size 2) --------|
//!    |                 ...                    |
//!    |<--------------- close -----------------|
//! ```
//!
//! Two transports implement the [`Transport`] capability: the
//! [`DirectTransport`] described above, and a [`PeerChannelTransport`]
//! placeholder that carries the same metadata and progress contract and
//! currently delegates to the direct transport.

mod direct;
mod peer;
mod progress;

pub use direct::{DirectSettings, DirectTransport};
pub use peer::PeerChannelTransport;
pub use progress::{
    bytes_per_second, estimate_remaining, format_eta, format_speed, TransferProgress,
};

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::checksum::{file_checksum, ChecksumAlgorithm};
use crate::config::{Config, TransportPreference};
use crate::error::{Error, Result};
use crate::session::TransferSession;

/// Progress callback: `(percentage in [0, 100], message)`.
///
/// Called synchronously from the transfer loop, so it should return quickly.
pub type ProgressFn<'a> = dyn Fn(f64, &str) + Send + Sync + 'a;

/// Identifies a transport implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Single TCP connection
    Direct,
    /// Negotiated peer channel
    PeerChannel,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::PeerChannel => write!(f, "peer-channel"),
        }
    }
}

/// A way of moving a session's files between two peers.
///
/// Every implementation sends the same metadata frame and reports progress
/// with the same `(percentage, message)` shape.
pub trait Transport {
    /// Which implementation this is.
    fn kind(&self) -> TransportKind;

    /// Serve the session's files to one receiver.
    fn send_files(
        &self,
        session: &TransferSession,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Pull a session's files from `endpoint` into `dest`.
    fn receive_files(
        &self,
        session_id: &str,
        endpoint: SocketAddr,
        dest: &Path,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ReceiveReport>> + Send;
}

/// The transport chosen for a manager.
#[derive(Debug, Clone)]
pub enum SelectedTransport {
    /// Direct TCP
    Direct(DirectTransport),
    /// Peer channel
    PeerChannel(PeerChannelTransport),
}

impl SelectedTransport {
    /// Pick a transport from configuration.
    ///
    /// `auto` takes the peer channel only when it is available.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let direct = DirectTransport::new(DirectSettings::from_config(config));
        match config.transfer.transport {
            TransportPreference::Direct => Self::Direct(direct),
            TransportPreference::PeerChannel => {
                Self::PeerChannel(PeerChannelTransport::new(direct))
            }
            TransportPreference::Auto => {
                if PeerChannelTransport::is_available() {
                    Self::PeerChannel(PeerChannelTransport::new(direct))
                } else {
                    Self::Direct(direct)
                }
            }
        }
    }
}

impl Transport for SelectedTransport {
    fn kind(&self) -> TransportKind {
        match self {
            Self::Direct(t) => t.kind(),
            Self::PeerChannel(t) => t.kind(),
        }
    }

    async fn send_files(
        &self,
        session: &TransferSession,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self {
            Self::Direct(t) => t.send_files(session, progress, cancel).await,
            Self::PeerChannel(t) => t.send_files(session, progress, cancel).await,
        }
    }

    async fn receive_files(
        &self,
        session_id: &str,
        endpoint: SocketAddr,
        dest: &Path,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<ReceiveReport> {
        match self {
            Self::Direct(t) => {
                t.receive_files(session_id, endpoint, dest, progress, cancel)
                    .await
            }
            Self::PeerChannel(t) => {
                t.receive_files(session_id, endpoint, dest, progress, cancel)
                    .await
            }
        }
    }
}

/// A file materialised by the receiver.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    /// File id from the metadata frame
    pub file_id: String,
    /// Name announced by the sender
    pub name: String,
    /// Where the file was written
    pub path: PathBuf,
    /// Bytes written
    pub size: u64,
    /// Digest recorded by the sender, if any
    pub expected_checksum: Option<String>,
}

/// Outcome of a completed receive.
#[derive(Debug, Clone)]
pub struct ReceiveReport {
    /// Session the files belong to
    pub session_id: String,
    /// Files in the order they were received
    pub files: Vec<ReceivedFile>,
    /// Total bytes received
    pub total_size: u64,
    /// Wall time from connect to last byte
    pub elapsed: Duration,
}

impl ReceiveReport {
    /// Average speed over the transfer, in bytes per second.
    #[must_use]
    pub fn bytes_per_second(&self) -> f64 {
        bytes_per_second(self.total_size, self.elapsed)
    }

    /// Recompute each file's digest and compare it to the sender's.
    ///
    /// Files without a recorded digest are treated as valid.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksumMismatch`] for the first file that differs,
    /// or an I/O error if a file cannot be read back.
    pub async fn verify(&self) -> Result<()> {
        for file in &self.files {
            let Some(expected) = file.expected_checksum.as_deref() else {
                tracing::debug!("No checksum recorded for {}, skipping", file.name);
                continue;
            };

            let actual = file_checksum(&file.path).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(Error::ChecksumMismatch {
                    file: file.name.clone(),
                    expected: expected.to_string(),
                    actual,
                });
            }
            tracing::debug!("Verified {} ({})", file.name, ChecksumAlgorithm::Md5);
        }
        Ok(())
    }
}

/// Invoke an optional progress callback.
pub(crate) fn report(progress: Option<&ProgressFn<'_>>, percentage: f64, message: &str) {
    if let Some(callback) = progress {
        callback(percentage.clamp(0.0, 100.0), message);
    }
}

/// Await `fut` bounded by `limit`, aborting when `cancel` fires.
pub(crate) async fn guarded<F, T, E>(cancel: &CancellationToken, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Error::Cancelled),
        r = tokio::time::timeout(limit, fut) => match r {
            Ok(inner) => inner.map_err(Into::into),
            Err(_) => Err(Error::Timeout(limit)),
        },
    }
}
