//! Discovery behaviour against live responders on loopback.

mod common;

use std::time::{Duration, Instant};

use tapshare_core::config::Config;
use tapshare_core::discovery::{DiscoveryClient, DiscoveryMessage};
use tapshare_core::PeerManager;
use tokio::net::UdpSocket;

#[tokio::test]
async fn test_unregistered_session_not_found_after_default_timeout() {
    let (discovery_port, _) = common::get_test_ports();

    let mut config = Config::default();
    config.network.broadcast_address = "127.0.0.1".parse().expect("ip");
    config.network.discovery_port = discovery_port;
    let client = DiscoveryClient::from_config(&config);

    let started = Instant::now();
    let endpoint = client.find("jt0000000000000000").await.expect("find");
    let elapsed = started.elapsed();

    assert_eq!(endpoint, None);
    assert!(elapsed >= Duration::from_secs(5), "returned after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(7), "returned after {elapsed:?}");
}

#[tokio::test]
async fn test_registered_session_is_found() {
    let (discovery_port, transfer_port) = common::get_test_ports();

    let sender = PeerManager::start(common::sender_config(discovery_port, transfer_port))
        .await
        .expect("start sender");
    let receiver = PeerManager::start(common::receiver_config(discovery_port))
        .await
        .expect("start receiver");

    assert!(sender.create_session("jt1111111111111111", &[]).await);

    let endpoint = receiver.discover_session("jt1111111111111111").await;
    assert_eq!(endpoint, Some(format!("127.0.0.1:{transfer_port}")));

    assert_eq!(receiver.discover_session("jt2222222222222222").await, None);

    sender.cleanup_session("jt1111111111111111").await;
    assert_eq!(receiver.discover_session("jt1111111111111111").await, None);

    sender.stop().await;
}

#[tokio::test]
async fn test_stopped_responder_no_longer_answers() {
    let (discovery_port, transfer_port) = common::get_test_ports();

    let sender = PeerManager::start(common::sender_config(discovery_port, transfer_port))
        .await
        .expect("start sender");
    assert!(sender.create_session("jt-stop", &[]).await);
    sender.stop().await;
    sender.stop().await;

    let mut config = common::receiver_config(discovery_port);
    config.transfer.discovery_timeout = Duration::from_millis(300);
    let receiver = PeerManager::start(config).await.expect("start receiver");
    assert_eq!(receiver.discover_session("jt-stop").await, None);
}

#[tokio::test]
async fn test_raw_datagram_exchange() {
    let (discovery_port, transfer_port) = common::get_test_ports();

    let sender = PeerManager::start(common::sender_config(discovery_port, transfer_port))
        .await
        .expect("start sender");
    assert!(sender.create_session("jt-raw", &[]).await);

    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let target = format!("127.0.0.1:{discovery_port}");

    socket
        .send_to(b"{ definitely not json", &target)
        .await
        .expect("send junk");
    socket
        .send_to(
            br#"{"type":"session_discovery","session_id":"jt-raw"}"#,
            &target,
        )
        .await
        .expect("send query");

    let mut buf = [0u8; 1024];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("reply in time")
        .expect("recv");

    let reply: serde_json::Value = serde_json::from_slice(&buf[..len]).expect("json reply");
    assert_eq!(reply["type"], "session_response");
    assert_eq!(reply["session_id"], "jt-raw");
    assert_eq!(reply["endpoint"], format!("127.0.0.1:{transfer_port}"));
    assert_eq!(
        DiscoveryMessage::parse(&buf[..len]),
        Some(DiscoveryMessage::SessionResponse {
            session_id: "jt-raw".to_string(),
            endpoint: format!("127.0.0.1:{transfer_port}"),
        })
    );

    sender.stop().await;
}
