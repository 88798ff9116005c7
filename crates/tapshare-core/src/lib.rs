//! # TapShare Core Library
//!
//! `tapshare-core` is the discovery-and-transfer engine behind TapShare, a
//! tap-to-share tool that moves a set of local files from one device to
//! another over the local network. Both peers agree on a session identifier
//! out-of-band (an NFC tap, a QR code, a typed code); this crate takes it
//! from there.
//!
//! ## Features
//!
//! - **Session registry**: in-memory transfer sessions keyed by identifier
//! - **Broadcast discovery**: UDP lookup of the sender's transfer endpoint
//! - **Direct transfer**: length-prefixed JSON metadata followed by raw file
//!   bytes over a single TCP connection
//! - **Integrity**: whole-file MD5 (or SHA-256) digests with optional
//!   post-receive verification
//! - **Cancellation**: every blocking step honours a `CancellationToken`
//!
//! ## Modules
//!
//! - [`checksum`] - File digests and verification
//! - [`config`] - Configuration management
//! - [`discovery`] - UDP broadcast session discovery
//! - [`mod@file`] - Chunking, filename sanitization and size formatting
//! - [`manager`] - The [`PeerManager`] façade used by front ends
//! - [`protocol`] - Wire framing and the metadata frame
//! - [`session`] - Transfer sessions, metadata and the session registry
//! - [`transfer`] - Transports, progress reporting and receive reports
//!
//! ## Example
//!
//! ```rust,ignore
//! use tapshare_core::{config::Config, PeerManager};
//!
//! let manager = PeerManager::start(Config::default()).await?;
//! manager.create_session("jt0123456789abcdef", &files).await;
//! manager.send_files("jt0123456789abcdef", None).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod checksum;
pub mod config;
pub mod discovery;
pub mod error;
pub mod file;
pub mod manager;
pub mod protocol;
pub mod session;
pub mod transfer;

pub use error::{Error, Result};
pub use manager::PeerManager;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default discovery port (UDP)
pub const DEFAULT_DISCOVERY_PORT: u16 = 45678;

/// Default transfer port (TCP)
pub const DEFAULT_TRANSFER_PORT: u16 = 45679;

/// Size of one file chunk moved per read/write call (8 KB)
pub const CHUNK_SIZE: usize = 8192;

/// Read increment used when folding a file into its checksum
pub const CHECKSUM_READ_SIZE: usize = 4096;

/// Largest metadata frame a receiver will accept (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest discovery datagram read from the socket
pub const MAX_DATAGRAM_SIZE: usize = 1024;
