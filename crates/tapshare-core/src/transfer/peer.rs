//! Peer channel transport.
//!
//! Placeholder for a negotiated peer-to-peer data channel. No channel
//! backend is linked, so every operation runs over the direct transport
//! with the same metadata frame and progress reporting.

use std::net::SocketAddr;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use super::{DirectTransport, ProgressFn, ReceiveReport, Transport, TransportKind};
use crate::error::Result;
use crate::session::TransferSession;

/// Peer channel transport falling back to [`DirectTransport`].
#[derive(Debug, Clone)]
pub struct PeerChannelTransport {
    fallback: DirectTransport,
}

impl PeerChannelTransport {
    /// Create the transport with the direct transport it falls back to.
    #[must_use]
    pub const fn new(fallback: DirectTransport) -> Self {
        Self { fallback }
    }

    /// Whether a peer channel backend is available on this build.
    #[must_use]
    pub const fn is_available() -> bool {
        false
    }
}

impl Transport for PeerChannelTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::PeerChannel
    }

    async fn send_files(
        &self,
        session: &TransferSession,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::warn!("Peer channel not available, falling back to direct transfer");
        self.fallback.send_files(session, progress, cancel).await
    }

    async fn receive_files(
        &self,
        session_id: &str,
        endpoint: SocketAddr,
        dest: &Path,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<ReceiveReport> {
        tracing::warn!("Peer channel not available, falling back to direct transfer");
        self.fallback
            .receive_files(session_id, endpoint, dest, progress, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::session::SessionOptions;
    use crate::transfer::DirectSettings;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_delegates_to_direct() {
        let src = TempDir::new().expect("create src dir");
        let path = src.path().join("a.txt");
        std::fs::write(&path, b"abc").expect("write file");
        let session = TransferSession::create("jt-peer", &[path], SessionOptions::default())
            .await
            .expect("create session");

        let transport = PeerChannelTransport::new(DirectTransport::new(DirectSettings {
            bind_addr: "127.0.0.1:0".parse().expect("addr"),
            accept_timeout: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(1),
            io_timeout: Duration::from_secs(1),
        }));

        assert_eq!(transport.kind(), TransportKind::PeerChannel);
        assert!(!PeerChannelTransport::is_available());

        // nobody connects, so the direct fallback's accept timeout surfaces
        let result = transport
            .send_files(&session, None, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }
}
