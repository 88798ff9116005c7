//! Network discovery for TapShare.
//!
//! A receiver knows only the session id. It broadcasts one query on the
//! discovery port and waits for the host that owns the session to answer
//! with its transfer endpoint.
//!
//! ## Protocol
//!
//! - Port: 45678 (UDP)
//! - One query per lookup, one reply expected, no retries
//! - Hosts that do not own the session stay silent
//!
//! ## Discovery Datagrams
//!
//! ```json
//! {"type": "session_discovery", "session_id": "jt3f9c2a7d41b08e55"}
//! {"type": "session_response", "session_id": "jt3f9c2a7d41b08e55", "endpoint": "192.168.1.20:45679"}
//! ```

mod responder;

pub use responder::DiscoveryResponder;

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::{DEFAULT_TRANSFER_PORT, MAX_DATAGRAM_SIZE};

/// Address probed to learn which interface routes off-host.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// A discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryMessage {
    /// Query: does this host own the session?
    SessionDiscovery {
        /// Session being looked up
        session_id: String,
    },
    /// Answer from the owning host
    SessionResponse {
        /// Session that was looked up
        session_id: String,
        /// `host:port` of the transfer listener
        endpoint: String,
    },
}

impl DiscoveryMessage {
    /// Parse a datagram, returning `None` for anything that is not a
    /// well-formed discovery message.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }

    /// Serialize to datagram bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Client side of discovery: one broadcast, one awaited reply.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    target: SocketAddr,
    timeout: Duration,
}

impl DiscoveryClient {
    /// Create a client that queries `target` and waits up to `timeout`.
    #[must_use]
    pub const fn new(target: SocketAddr, timeout: Duration) -> Self {
        Self { target, timeout }
    }

    /// Create a client from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.network.discovery_target(),
            config.transfer.discovery_timeout,
        )
    }

    /// Address queries are sent to.
    #[must_use]
    pub const fn target(&self) -> SocketAddr {
        self.target
    }

    /// Look up the transfer endpoint for a session.
    ///
    /// Returns `Ok(None)` when no reply arrives in time or the single reply
    /// received is malformed or names another session.
    ///
    /// # Errors
    ///
    /// Returns an error only if the query socket cannot be set up or the
    /// query cannot be sent.
    pub async fn find(&self, session_id: &str) -> Result<Option<String>> {
        self.find_with_cancel(session_id, &CancellationToken::new())
            .await
    }

    /// Like [`find`](Self::find), aborting when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if cancelled, or an error if the query
    /// socket cannot be set up.
    pub async fn find_with_cancel(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let socket = broadcast_socket()?;

        let query = DiscoveryMessage::SessionDiscovery {
            session_id: session_id.to_string(),
        }
        .to_bytes()?;
        socket.send_to(&query, self.target).await?;
        tracing::debug!(session_id = %session_id, "Sent discovery query to {}", self.target);

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let received = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            r = tokio::time::timeout(self.timeout, socket.recv_from(&mut buf)) => r,
        };

        let (len, source) = match received {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!("Error receiving discovery reply: {}", e);
                return Ok(None);
            }
            Err(_) => {
                tracing::debug!(session_id = %session_id, "No discovery reply within {:?}", self.timeout);
                return Ok(None);
            }
        };

        match DiscoveryMessage::parse(&buf[..len]) {
            Some(DiscoveryMessage::SessionResponse {
                session_id: answered,
                endpoint,
            }) if answered == session_id => {
                tracing::info!(session_id = %session_id, "Session found at {} (via {})", endpoint, source);
                Ok(Some(endpoint))
            }
            _ => {
                tracing::warn!("Ignoring unexpected discovery reply from {}", source);
                Ok(None)
            }
        }
    }
}

/// Open a UDP socket able to send broadcasts from an ephemeral port.
fn broadcast_socket() -> Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_broadcast(true)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&addr.into())?;

    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Best-effort local IP address used in discovery replies.
///
/// Asks the OS which interface would route to a public address (no packet
/// is sent) and falls back to `127.0.0.1`.
#[must_use]
pub fn local_ip() -> IpAddr {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect(ROUTE_PROBE_ADDR)?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .ok()
        .filter(|ip| !ip.is_unspecified())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Parse an endpoint string into a `SocketAddr`.
///
/// Accepts formats:
/// - `IP:PORT` (e.g., `192.168.1.20:45679`)
/// - `[IPv6]:PORT` (e.g., `[::1]:45679`)
/// - `IP` or `[IPv6]` alone, using the default transfer port
///
/// # Errors
///
/// Returns [`Error::InvalidEndpoint`] if the string cannot be parsed.
pub fn parse_endpoint(endpoint: &str) -> Result<SocketAddr> {
    let endpoint = endpoint.trim();

    if let Ok(addr) = endpoint.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Some(ip_str) = endpoint
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        let ip: IpAddr = ip_str.parse().map_err(|_| invalid_endpoint(endpoint))?;
        return Ok(SocketAddr::new(ip, DEFAULT_TRANSFER_PORT));
    }

    if let Ok(ip) = endpoint.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_TRANSFER_PORT));
    }

    if let Some((ip_part, port_part)) = endpoint.rsplit_once(':') {
        if !ip_part.contains(':') {
            let ip: IpAddr = ip_part.parse().map_err(|_| invalid_endpoint(endpoint))?;
            let port: u16 = port_part.parse().map_err(|_| {
                Error::InvalidEndpoint(format!(
                    "invalid port '{port_part}', must be a number between 1 and 65535"
                ))
            })?;
            return Ok(SocketAddr::new(ip, port));
        }
    }

    Err(invalid_endpoint(endpoint))
}

fn invalid_endpoint(endpoint: &str) -> Error {
    Error::InvalidEndpoint(format!(
        "'{endpoint}', expected IP:PORT (e.g., 192.168.1.20:45679)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let query = DiscoveryMessage::SessionDiscovery {
            session_id: "jt0000000000000000".to_string(),
        };
        let json: serde_json::Value =
            serde_json::from_slice(&query.to_bytes().expect("serialize")).expect("json");
        assert_eq!(json["type"], "session_discovery");
        assert_eq!(json["session_id"], "jt0000000000000000");

        let reply = DiscoveryMessage::parse(
            br#"{"type":"session_response","session_id":"jt1","endpoint":"10.0.0.2:45679"}"#,
        );
        assert_eq!(
            reply,
            Some(DiscoveryMessage::SessionResponse {
                session_id: "jt1".to_string(),
                endpoint: "10.0.0.2:45679".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(DiscoveryMessage::parse(b"hello"), None);
        assert_eq!(DiscoveryMessage::parse(br#"{"type":"ping"}"#), None);
        assert_eq!(
            DiscoveryMessage::parse(br#"{"type":"session_discovery"}"#),
            None
        );
    }

    #[test]
    fn test_parse_endpoint_ipv4_with_port() {
        let addr = parse_endpoint("192.168.1.20:45679").expect("parse");
        assert_eq!(addr.ip().to_string(), "192.168.1.20");
        assert_eq!(addr.port(), 45679);
    }

    #[test]
    fn test_parse_endpoint_defaults_port() {
        let addr = parse_endpoint("  10.1.2.3 ").expect("parse");
        assert_eq!(addr.port(), DEFAULT_TRANSFER_PORT);

        let addr = parse_endpoint("[::1]").expect("parse");
        assert_eq!(addr.ip().to_string(), "::1");
        assert_eq!(addr.port(), DEFAULT_TRANSFER_PORT);
    }

    #[test]
    fn test_parse_endpoint_ipv6_with_port() {
        let addr = parse_endpoint("[2001:db8::1]:5000").expect("parse");
        assert_eq!(addr.ip().to_string(), "2001:db8::1");
        assert_eq!(addr.port(), 5000);
    }

    #[test]
    fn test_parse_endpoint_invalid() {
        assert!(matches!(
            parse_endpoint("not-an-ip"),
            Err(Error::InvalidEndpoint(_))
        ));
        assert!(parse_endpoint("192.168.1.20:abc").is_err());
        assert!(parse_endpoint("192.168.1.256:1").is_err());
        assert!(parse_endpoint("").is_err());
    }

    #[test]
    fn test_local_ip_is_specified() {
        assert!(!local_ip().is_unspecified());
    }

    #[tokio::test]
    async fn test_find_times_out_without_responder() {
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind silent peer");
        let target = silent.local_addr().expect("addr");

        let client = DiscoveryClient::new(target, Duration::from_millis(200));
        let started = std::time::Instant::now();
        let result = client.find("jt0000000000000000").await.expect("find");

        assert_eq!(result, None);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_find_ignores_foreign_reply() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.expect("bind peer");
        let target = peer.local_addr().expect("addr");

        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            if let Ok((_, from)) = peer.recv_from(&mut buf).await {
                let reply = DiscoveryMessage::SessionResponse {
                    session_id: "jt-other".to_string(),
                    endpoint: "127.0.0.1:1".to_string(),
                };
                let _ = peer
                    .send_to(&reply.to_bytes().expect("serialize"), from)
                    .await;
            }
        });

        let client = DiscoveryClient::new(target, Duration::from_secs(2));
        assert_eq!(client.find("jt-mine").await.expect("find"), None);
    }

    #[tokio::test]
    async fn test_find_cancelled() {
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind silent peer");
        let client = DiscoveryClient::new(silent.local_addr().expect("addr"), Duration::from_secs(30));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client.find_with_cancel("jt1", &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
