//! Configuration management for TapShare.
//!
//! This module handles loading, saving, and managing TapShare configuration.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/tapshare/config.toml` |
//! | macOS | `~/Library/Application Support/com.tapshare.TapShare/config.toml` |
//! | Windows | `%APPDATA%\tapshare\TapShare\config\config.toml` |
//!
//! ## Example
//!
//! ```toml
//! [network]
//! discovery_port = 45678
//! transfer_port = 45679
//! broadcast_address = "255.255.255.255"
//!
//! [transfer]
//! accept_timeout = "30s"
//! discovery_timeout = "5s"
//! verify_checksums = false
//! transport = "auto"
//!
//! [storage]
//! download_dir = "/home/me/Downloads/TapShare"
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::session::{SessionOptions, DEFAULT_CHECKSUM_SIZE_LIMIT};

/// Main configuration struct for TapShare.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network settings
    pub network: NetworkConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Storage settings
    pub storage: StorageConfig,
}

/// Network configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Discovery port (UDP)
    pub discovery_port: u16,
    /// Transfer port (TCP)
    pub transfer_port: u16,
    /// Destination of discovery broadcasts
    pub broadcast_address: IpAddr,
    /// Local address the responder and transfer listener bind to
    pub bind_address: IpAddr,
    /// IP advertised in discovery replies instead of the detected local IP
    pub advertise_host: Option<IpAddr>,
    /// Run the discovery responder (receive-only hosts may turn it off)
    pub answer_discovery: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: crate::DEFAULT_DISCOVERY_PORT,
            transfer_port: crate::DEFAULT_TRANSFER_PORT,
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertise_host: None,
            answer_discovery: true,
        }
    }
}

impl NetworkConfig {
    /// Address the discovery responder binds to.
    #[must_use]
    pub fn discovery_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.discovery_port)
    }

    /// Address discovery queries are sent to.
    #[must_use]
    pub fn discovery_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_address, self.discovery_port)
    }

    /// Address the transfer listener binds to.
    #[must_use]
    pub fn transfer_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.transfer_port)
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// How long the sender waits for a receiver to connect
    #[serde(with = "humantime_serde")]
    pub accept_timeout: Duration,
    /// How long the receiver waits for the connection to open
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Limit on any single read or write once connected
    #[serde(with = "humantime_serde")]
    pub io_timeout: Duration,
    /// How long a discovery query waits for its reply
    #[serde(with = "humantime_serde")]
    pub discovery_timeout: Duration,
    /// Verify checksums after receiving
    pub verify_checksums: bool,
    /// Files larger than this are not checksummed at session creation
    pub checksum_size_limit: u64,
    /// Preferred transport
    pub transport: TransportPreference,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            accept_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(30),
            discovery_timeout: Duration::from_secs(5),
            verify_checksums: false,
            checksum_size_limit: DEFAULT_CHECKSUM_SIZE_LIMIT,
            transport: TransportPreference::Auto,
        }
    }
}

impl TransferConfig {
    /// Options used when building sessions.
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            checksum_size_limit: self.checksum_size_limit,
        }
    }
}

/// Which transport the manager should use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportPreference {
    /// Use the best available transport
    #[default]
    Auto,
    /// Always use the direct TCP transport
    Direct,
    /// Use the peer channel transport
    PeerChannel,
}

/// Storage configuration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Default destination directory for received files
    pub download_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Destination directory, falling back to the platform download folder.
    #[must_use]
    pub fn resolve_download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| {
            directories::UserDirs::new()
                .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
                .unwrap_or_else(|| PathBuf::from("."))
                .join("TapShare")
        })
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    ///
    /// Creates the parent directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("Failed to create config directory: {e}"))
            })?;
        }

        let content = self.to_toml()?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))
    }

    /// Get the default configuration directory path.
    #[must_use]
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tapshare", "TapShare")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();

        let (digits, scale) = if let Some(ms) = s.strip_suffix("ms") {
            (ms, 0)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, 3600)
        } else {
            return Err(serde::de::Error::custom("invalid duration format"));
        };

        let value: u64 = digits.trim().parse().map_err(serde::de::Error::custom)?;
        if scale == 0 {
            return Ok(Duration::from_millis(value));
        }
        value
            .checked_mul(scale)
            .map(Duration::from_secs)
            .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {s}")))
    }
}
