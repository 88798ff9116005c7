//! Whole-file integrity digests.
//!
//! Files are folded into a single digest by reading them in fixed
//! [`CHECKSUM_READ_SIZE`](crate::CHECKSUM_READ_SIZE) increments. Digests are
//! lowercase hex strings so they can travel inside the JSON metadata frame.
//!
//! - MD5 is the session default and the digest recorded in file metadata.
//! - SHA-256 is available for callers that verify with a stronger hash.
//!
//! Verification compares hex digests case-insensitively. An absent or empty
//! expected digest is treated as trivially valid and the file is not read.

use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::Result;
use crate::CHECKSUM_READ_SIZE;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5 (128-bit), used for session metadata
    #[default]
    Md5,
    /// SHA-256 (256-bit)
    Sha256,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

enum Hasher {
    Md5(Md5),
    Sha256(Sha256),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Self::Md5(Md5::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Compute the digest of an in-memory buffer.
#[must_use]
pub fn checksum_bytes(data: &[u8], algorithm: ChecksumAlgorithm) -> String {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Compute the MD5 digest of a file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub async fn file_checksum(path: &Path) -> Result<String> {
    file_checksum_with(path, ChecksumAlgorithm::Md5).await
}

/// Compute the digest of a file with the given algorithm.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub async fn file_checksum_with(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; CHECKSUM_READ_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finalize_hex())
}

/// Verify a file against an expected digest.
///
/// Returns `Ok(true)` without touching the file when `expected` is `None`
/// or empty.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn verify_checksum(
    path: &Path,
    expected: Option<&str>,
    algorithm: ChecksumAlgorithm,
) -> Result<bool> {
    let Some(expected) = expected.filter(|e| !e.is_empty()) else {
        return Ok(true);
    };

    let actual = file_checksum_with(path, algorithm).await?;
    Ok(actual.eq_ignore_ascii_case(expected))
}
