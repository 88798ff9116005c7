//! Common test utilities for `TapShare` integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tapshare_core::config::Config;

/// Base port for tests, incremented for each test to avoid conflicts.
static TEST_PORT_COUNTER: AtomicU16 = AtomicU16::new(46600);

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &Path, path2: &Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1, content2, "File contents differ");
}

/// Get unique ports for a test to avoid conflicts between parallel tests.
/// Returns (`discovery_port`, `transfer_port`).
pub fn get_test_ports() -> (u16, u16) {
    let base = TEST_PORT_COUNTER.fetch_add(2, Ordering::SeqCst);
    (base, base + 1)
}

/// Configuration for a sender confined to the loopback interface.
pub fn sender_config(discovery_port: u16, transfer_port: u16) -> Config {
    let mut config = Config::default();
    config.network.bind_address = "127.0.0.1".parse().expect("ip");
    config.network.broadcast_address = "127.0.0.1".parse().expect("ip");
    config.network.advertise_host = Some("127.0.0.1".parse().expect("ip"));
    config.network.discovery_port = discovery_port;
    config.network.transfer_port = transfer_port;
    config.transfer.accept_timeout = Duration::from_secs(10);
    config.transfer.connect_timeout = Duration::from_secs(5);
    config.transfer.io_timeout = Duration::from_secs(5);
    config.transfer.discovery_timeout = Duration::from_secs(2);
    config
}

/// Configuration for a receive-only peer querying `discovery_port` on loopback.
pub fn receiver_config(discovery_port: u16) -> Config {
    let mut config = sender_config(discovery_port, 0);
    config.network.answer_discovery = false;
    config
}

/// Wait until `check` holds, polling every 10ms for up to 5 seconds.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5 seconds"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
