//! The peer manager façade.
//!
//! [`PeerManager`] owns the session registry, the discovery responder and
//! the selected transport. Front ends drive a transfer through it:
//!
//! ```text
//! sender:   create_session -> send_files -> cleanup_session
//! receiver: receive_files (discovers, connects, writes files)
//! ```
//!
//! Each operation comes in two flavours. The `try_*` methods return
//! [`Result`]; the plain methods log failures and return `bool`/`Option`
//! so a UI can map them straight to status text.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::discovery::{local_ip, parse_endpoint, DiscoveryClient, DiscoveryResponder};
use crate::error::{Error, Result};
use crate::session::{SessionRegistry, TransferSession};
use crate::transfer::{ProgressFn, ReceiveReport, SelectedTransport, Transport, TransportKind};

/// Top-level engine handle.
#[derive(Debug)]
pub struct PeerManager {
    config: Config,
    registry: SessionRegistry,
    endpoint: String,
    responder: Option<DiscoveryResponder>,
    discovery: DiscoveryClient,
    transport: SelectedTransport,
}

impl PeerManager {
    /// Start the engine: bind the discovery responder and pick a transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the discovery port cannot be bound.
    pub async fn start(config: Config) -> Result<Self> {
        let registry = SessionRegistry::new();

        let host = config.network.advertise_host.unwrap_or_else(local_ip);
        let endpoint = SocketAddr::new(host, config.network.transfer_port).to_string();

        let responder = if config.network.answer_discovery {
            Some(
                DiscoveryResponder::start(
                    config.network.discovery_bind_addr(),
                    registry.clone(),
                    endpoint.clone(),
                )
                .await?,
            )
        } else {
            tracing::debug!("Discovery responder disabled");
            None
        };
        let discovery = DiscoveryClient::from_config(&config);
        let transport = SelectedTransport::from_config(&config);

        tracing::info!(
            "Peer manager started (endpoint {}, {} transport)",
            endpoint,
            transport.kind()
        );

        Ok(Self {
            config,
            registry,
            endpoint,
            responder,
            discovery,
            transport,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The session registry.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Endpoint advertised to receivers.
    #[must_use]
    pub fn advertised_endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Address the discovery responder is bound to, if it runs.
    #[must_use]
    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.responder.as_ref().map(DiscoveryResponder::local_addr)
    }

    /// Transport in use.
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Look up a registered session.
    pub async fn session(&self, session_id: &str) -> Option<Arc<TransferSession>> {
        self.registry.get(session_id).await
    }

    /// Build a session from `files` and register it.
    ///
    /// Unreadable files are left out of the session; inspect
    /// [`TransferSession::skipped_files`] on the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSessionId`] for an empty id.
    pub async fn try_create_session(
        &self,
        session_id: &str,
        files: &[PathBuf],
    ) -> Result<Arc<TransferSession>> {
        let session = Arc::new(
            TransferSession::create(session_id, files, self.config.transfer.session_options())
                .await?,
        );

        tracing::info!(
            session_id = %session_id,
            "Session created with {} files ({} bytes)",
            session.manifest().len(),
            session.total_size()
        );

        if self.registry.insert(Arc::clone(&session)).await.is_some() {
            tracing::warn!(session_id = %session_id, "Replaced existing session");
        }

        Ok(session)
    }

    /// Build and register a session.
    ///
    /// Returns `false` if the session could not be created or any file had
    /// to be skipped. A session with skipped files is still registered.
    pub async fn create_session(&self, session_id: &str, files: &[PathBuf]) -> bool {
        match self.try_create_session(session_id, files).await {
            Ok(session) => session.skipped_files().is_empty(),
            Err(e) => {
                tracing::error!(session_id = %session_id, "Error creating session: {}", e);
                false
            }
        }
    }

    /// Find the endpoint serving a session on the local network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if nobody answers in time, or
    /// [`Error::Cancelled`] if cancelled.
    pub async fn try_discover_session(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.discovery
            .find_with_cancel(session_id, cancel)
            .await?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Find the endpoint serving a session, or `None`.
    pub async fn discover_session(&self, session_id: &str) -> Option<String> {
        match self
            .try_discover_session(session_id, &CancellationToken::new())
            .await
        {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                tracing::error!(session_id = %session_id, "Error discovering session: {}", e);
                None
            }
        }
    }

    /// Serve a registered session to one receiver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSession`] if the session is not registered,
    /// [`Error::SessionBusy`] if it is already being served, or any
    /// transport error.
    pub async fn try_send_files(
        &self,
        session_id: &str,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| Error::UnknownSession(session_id.to_string()))?;

        self.transport.send_files(&session, progress, cancel).await
    }

    /// Serve a registered session to one receiver, returning success.
    pub async fn send_files(&self, session_id: &str, progress: Option<&ProgressFn<'_>>) -> bool {
        self.send_files_with_cancel(session_id, progress, &CancellationToken::new())
            .await
    }

    /// Like [`send_files`](Self::send_files), abortable through `cancel`.
    pub async fn send_files_with_cancel(
        &self,
        session_id: &str,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> bool {
        match self.try_send_files(session_id, progress, cancel).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(session_id = %session_id, "Error sending files: {}", e);
                false
            }
        }
    }

    /// Discover a session and pull its files into `dest`.
    ///
    /// Checksums are verified afterwards when `transfer.verify_checksums`
    /// is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] if discovery fails,
    /// [`Error::SessionMismatch`] if the sender serves another session,
    /// [`Error::ChecksumMismatch`] if verification fails, or any transport
    /// error.
    pub async fn try_receive_files(
        &self,
        session_id: &str,
        dest: &Path,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<ReceiveReport> {
        let endpoint = self.try_discover_session(session_id, cancel).await?;
        let addr = parse_endpoint(&endpoint)?;

        let report = self
            .transport
            .receive_files(session_id, addr, dest, progress, cancel)
            .await?;

        if self.config.transfer.verify_checksums {
            report.verify().await?;
            tracing::info!(session_id = %session_id, "All checksums verified");
        }

        Ok(report)
    }

    /// Discover a session and pull its files, returning success.
    pub async fn receive_files(
        &self,
        session_id: &str,
        dest: &Path,
        progress: Option<&ProgressFn<'_>>,
    ) -> bool {
        self.receive_files_with_cancel(session_id, dest, progress, &CancellationToken::new())
            .await
    }

    /// Like [`receive_files`](Self::receive_files), abortable through `cancel`.
    pub async fn receive_files_with_cancel(
        &self,
        session_id: &str,
        dest: &Path,
        progress: Option<&ProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> bool {
        match self
            .try_receive_files(session_id, dest, progress, cancel)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(session_id = %session_id, "Error receiving files: {}", e);
                false
            }
        }
    }

    /// Forget a session. Unknown ids are ignored.
    pub async fn cleanup_session(&self, session_id: &str) {
        if self.registry.remove(session_id).await.is_some() {
            tracing::info!(session_id = %session_id, "Session cleaned up");
        }
    }

    /// Stop the discovery responder. Safe to call repeatedly.
    pub async fn stop(&self) {
        if let Some(responder) = &self.responder {
            responder.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn local_config() -> Config {
        let mut config = Config::default();
        config.network.bind_address = "127.0.0.1".parse().expect("ip");
        config.network.broadcast_address = "127.0.0.1".parse().expect("ip");
        config.network.advertise_host = Some("127.0.0.1".parse().expect("ip"));
        config.network.discovery_port = 0;
        config.network.transfer_port = 0;
        config.transfer.discovery_timeout = Duration::from_millis(200);
        config
    }

    fn free_udp_port() -> u16 {
        std::net::UdpSocket::bind("127.0.0.1:0")
            .and_then(|s| s.local_addr())
            .expect("probe port")
            .port()
    }

    #[tokio::test]
    async fn test_create_and_cleanup_session() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("b.txt");
        std::fs::write(&a, vec![1u8; 10]).expect("write a");
        std::fs::write(&b, vec![2u8; 16385]).expect("write b");

        let manager = PeerManager::start(local_config()).await.expect("start");
        assert!(manager.create_session("jt-create", &[a, b]).await);

        let session = manager.session("jt-create").await.expect("registered");
        assert_eq!(session.total_size(), 16395);

        manager.cleanup_session("jt-create").await;
        manager.cleanup_session("jt-create").await;
        assert!(manager.session("jt-create").await.is_none());

        manager.stop().await;
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_create_session_reports_skipped_file() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let present = temp_dir.path().join("present.txt");
        std::fs::write(&present, b"ok").expect("write");

        let manager = PeerManager::start(local_config()).await.expect("start");
        let ok = manager
            .create_session("jt-partial", &[present, temp_dir.path().join("missing.txt")])
            .await;

        assert!(!ok);
        let session = manager.session("jt-partial").await.expect("still registered");
        assert_eq!(session.manifest().len(), 1);
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_create_session_empty_id() {
        let manager = PeerManager::start(local_config()).await.expect("start");
        assert!(!manager.create_session("", &[]).await);
        assert!(manager.registry().is_empty().await);
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_responder_can_be_disabled() {
        let mut config = local_config();
        config.network.answer_discovery = false;
        let manager = PeerManager::start(config).await.expect("start");
        assert!(manager.discovery_addr().is_none());
        assert_eq!(manager.advertised_endpoint(), "127.0.0.1:0");
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_send_unknown_session() {
        let manager = PeerManager::start(local_config()).await.expect("start");
        let result = manager
            .try_send_files("jt-nope", None, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::UnknownSession(_))));
        assert!(!manager.send_files("jt-nope", None).await);
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_discover_own_session() {
        let mut config = local_config();
        config.transfer.discovery_timeout = Duration::from_secs(2);
        let manager = PeerManager::start(config).await.expect("start");

        // port 0 was requested, so aim the client at the real bound port
        let responder_addr = manager.discovery_addr().expect("responder running");
        let client = DiscoveryClient::new(responder_addr, Duration::from_secs(2));
        assert!(manager.create_session("jt-self", &[]).await);
        let endpoint = client.find("jt-self").await.expect("find");
        assert_eq!(endpoint.as_deref(), Some(manager.advertised_endpoint()));
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_receive_unknown_session_fails() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let mut config = local_config();
        // queries land on our own responder, which stays silent for unknown ids
        config.network.discovery_port = free_udp_port();
        let manager = PeerManager::start(config).await.expect("start");

        let result = manager
            .try_receive_files(
                "jt0000000000000000",
                temp_dir.path(),
                None,
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(Error::SessionNotFound(_))));
        manager.stop().await;
    }
}
