//! Session identifier generation and validation.
//!
//! Identifiers normally come from the pairing channel (NFC tap, QR code),
//! and the engine accepts any non-empty string. Front ends that mint their
//! own identifiers use the `jt` + 16 lowercase hex format produced here.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Prefix carried by generated session identifiers.
pub const SESSION_ID_PREFIX: &str = "jt";

/// Number of hex characters following the prefix.
pub const SESSION_ID_HEX_LEN: usize = 16;

/// Generate a fresh session identifier.
///
/// The identifier mixes the current time, random bytes and a UUID through
/// SHA-256 and keeps the first 16 hex characters.
#[must_use]
pub fn generate_session_id() -> String {
    use rand::RngCore;

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());

    let mut random = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut random);

    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let combined = format!("{timestamp}-{}-{}", hex::encode(random), &uuid[..8]);

    let digest = hex::encode(Sha256::digest(combined.as_bytes()));
    format!("{SESSION_ID_PREFIX}{}", &digest[..SESSION_ID_HEX_LEN])
}

/// Check whether `id` has the `jt` + 16 hex digit shape.
///
/// Generated ids are lowercase, but hex digits of either case are accepted.
#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    id.strip_prefix(SESSION_ID_PREFIX).is_some_and(|rest| {
        rest.len() == SESSION_ID_HEX_LEN && rest.chars().all(|c| c.is_ascii_hexdigit())
    })
}

/// Reject identifiers the engine cannot key a session by.
///
/// # Errors
///
/// Returns [`Error::InvalidSessionId`] for empty or whitespace-only input.
pub fn ensure_usable(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::InvalidSessionId("session id must not be empty".to_string()));
    }
    Ok(())
}
