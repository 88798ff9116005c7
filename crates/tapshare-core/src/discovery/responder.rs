//! Background responder answering discovery queries for local sessions.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::DiscoveryMessage;
use crate::error::{Error, Result};
use crate::session::SessionRegistry;
use crate::MAX_DATAGRAM_SIZE;

/// Answers `session_discovery` queries for sessions in a registry.
///
/// The responder owns one UDP socket and one spawned task. Queries for
/// sessions it does not hold are ignored, never answered negatively.
#[derive(Debug)]
pub struct DiscoveryResponder {
    local_addr: SocketAddr,
    endpoint: String,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryResponder {
    /// Bind the discovery socket and start answering queries.
    ///
    /// `endpoint` is the `host:port` advertised in every reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the socket cannot be bound.
    pub async fn start(
        bind_addr: SocketAddr,
        registry: SessionRegistry,
        endpoint: String,
    ) -> Result<Self> {
        let socket = bind_socket(bind_addr).map_err(|source| Error::Bind {
            addr: bind_addr,
            source,
        })?;
        let local_addr = socket.local_addr()?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(respond_loop(
            socket,
            registry,
            endpoint.clone(),
            cancel.clone(),
        ));

        tracing::info!("Discovery responder listening on {}", local_addr);

        Ok(Self {
            local_addr,
            endpoint,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Address the responder socket is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Endpoint advertised in replies.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether the responder task is still running.
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop answering and release the socket. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("Discovery responder task ended abnormally: {}", e);
            }
            tracing::info!("Discovery responder stopped");
        }
    }
}

impl Drop for DiscoveryResponder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn bind_socket(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_reuse_address(true)?;

    #[cfg(target_os = "macos")]
    socket.set_reuse_port(true)?;

    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

async fn respond_loop(
    socket: UdpSocket,
    registry: SessionRegistry,
    endpoint: String,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];

    loop {
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            r = socket.recv_from(&mut buf) => r,
        };

        match received {
            Ok((len, source)) => {
                if let Err(e) = answer(&socket, &registry, &endpoint, &buf[..len], source).await {
                    tracing::warn!("Failed to answer discovery query from {}: {}", source, e);
                }
            }
            Err(e) => {
                // ICMP port-unreachable from a vanished querier surfaces here on some platforms.
                tracing::debug!("Discovery receive error: {}", e);
            }
        }
    }
}

async fn answer(
    socket: &UdpSocket,
    registry: &SessionRegistry,
    endpoint: &str,
    datagram: &[u8],
    source: SocketAddr,
) -> Result<()> {
    let Some(DiscoveryMessage::SessionDiscovery { session_id }) = DiscoveryMessage::parse(datagram)
    else {
        tracing::debug!("Ignoring non-query datagram from {}", source);
        return Ok(());
    };

    if !registry.contains(&session_id).await {
        tracing::debug!(session_id = %session_id, "Ignoring query for unknown session from {}", source);
        return Ok(());
    }

    let reply = DiscoveryMessage::SessionResponse {
        session_id: session_id.clone(),
        endpoint: endpoint.to_string(),
    }
    .to_bytes()?;
    socket.send_to(&reply, source).await?;

    tracing::info!(session_id = %session_id, "Answered discovery query from {}", source);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::DiscoveryClient;
    use crate::session::{SessionOptions, TransferSession};
    use std::sync::Arc;
    use std::time::Duration;

    async fn registry_with(id: &str) -> SessionRegistry {
        let registry = SessionRegistry::new();
        registry
            .insert(Arc::new(
                TransferSession::create(id, &[], SessionOptions::default())
                    .await
                    .expect("create session"),
            ))
            .await;
        registry
    }

    async fn start_local(registry: SessionRegistry) -> DiscoveryResponder {
        DiscoveryResponder::start(
            "127.0.0.1:0".parse().expect("addr"),
            registry,
            "127.0.0.1:45679".to_string(),
        )
        .await
        .expect("start responder")
    }

    #[tokio::test]
    async fn test_answers_registered_session() {
        let responder = start_local(registry_with("jt-known").await).await;
        let client = DiscoveryClient::new(responder.local_addr(), Duration::from_secs(2));

        let endpoint = client.find("jt-known").await.expect("find");
        assert_eq!(endpoint.as_deref(), Some("127.0.0.1:45679"));

        responder.stop().await;
    }

    #[tokio::test]
    async fn test_ignores_unknown_session() {
        let responder = start_local(registry_with("jt-known").await).await;
        let client = DiscoveryClient::new(responder.local_addr(), Duration::from_millis(300));

        assert_eq!(client.find("jt-unknown").await.expect("find"), None);

        responder.stop().await;
    }

    #[tokio::test]
    async fn test_survives_garbage_datagrams() {
        let responder = start_local(registry_with("jt-known").await).await;

        let junk = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        junk.send_to(b"\x00\x01not json", responder.local_addr())
            .await
            .expect("send junk");

        let client = DiscoveryClient::new(responder.local_addr(), Duration::from_secs(2));
        assert!(client.find("jt-known").await.expect("find").is_some());
        assert!(responder.is_running().await);

        responder.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let responder = start_local(SessionRegistry::new()).await;
        assert!(responder.is_running().await);

        responder.stop().await;
        responder.stop().await;
        assert!(!responder.is_running().await);
    }

    #[tokio::test]
    async fn test_stop_releases_socket() {
        let responder = start_local(SessionRegistry::new()).await;
        let addr = responder.local_addr();

        responder.stop().await;

        std::net::UdpSocket::bind(addr).expect("port free after stop");
    }

    #[tokio::test]
    async fn test_unbindable_address_reports_bind_error() {
        let bogus: SocketAddr = "203.0.113.1:0".parse().expect("addr");

        let result =
            DiscoveryResponder::start(bogus, SessionRegistry::new(), String::new()).await;
        assert!(matches!(result, Err(Error::Bind { .. })));
    }
}
