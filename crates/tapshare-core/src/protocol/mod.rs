//! Wire framing for the transfer connection.
//!
//! Structured messages on the TCP stream are JSON documents behind a length
//! prefix. Exactly one such message, the metadata frame, is exchanged per
//! transfer; raw file bytes follow it with no further framing.
//!
//! ## Frame Format
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────┐
//! │    Length    │             Payload              │
//! │   4 bytes    │   UTF-8 JSON, `Length` bytes     │
//! │  big-endian  │                                  │
//! └──────────────┴──────────────────────────────────┘
//! ```
//!
//! Followed on the wire by the concatenated bytes of every file, in the
//! order the metadata lists them, each exactly `size` bytes long.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::session::{FileManifest, TransferSession};
use crate::MAX_FRAME_SIZE;

/// Length prefix size in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// The metadata frame sent by the sender before any file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFrame {
    /// Session the transfer belongs to
    pub session_id: String,
    /// Per-file metadata in transfer order
    pub files: FileManifest,
    /// Sum of all file sizes
    pub total_size: u64,
}

impl MetadataFrame {
    /// Build the frame describing a session.
    #[must_use]
    pub fn for_session(session: &TransferSession) -> Self {
        Self {
            session_id: session.session_id().to_string(),
            files: session.manifest().clone(),
            total_size: session.total_size(),
        }
    }

    /// Check the frame belongs to `expected` and is self-consistent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionMismatch`] for a foreign session id, or
    /// [`Error::ProtocolError`] if `total_size` disagrees with the files.
    pub fn validate(&self, expected: &str) -> Result<()> {
        if self.session_id != expected {
            return Err(Error::SessionMismatch {
                expected: expected.to_string(),
                actual: self.session_id.clone(),
            });
        }

        let declared = self.files.total_size();
        if declared != self.total_size {
            return Err(Error::ProtocolError(format!(
                "total_size {} does not match file sizes {}",
                self.total_size, declared
            )));
        }

        Ok(())
    }
}

/// Encode a message payload to JSON bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a message payload from JSON bytes.
///
/// # Errors
///
/// Returns an error if deserialization fails.
pub fn decode_payload<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| Error::Serialization(e.to_string()))
}

/// Read one length-prefixed frame from a stream.
///
/// # Errors
///
/// Returns [`Error::ConnectionClosed`] if the stream ends before the full
/// frame arrives, or [`Error::FrameTooLarge`] if the prefix exceeds
/// [`MAX_FRAME_SIZE`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncReadExt + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    read_exact_or_closed(reader, &mut prefix, "length prefix").await?;

    let length = u32::from_be_bytes(prefix) as usize;
    if length > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(length));
    }

    let mut payload = vec![0u8; length];
    if length > 0 {
        read_exact_or_closed(reader, &mut payload, "frame payload").await?;
    }

    Ok(payload)
}

/// Write one length-prefixed frame to a stream.
///
/// # Errors
///
/// Returns an error if the payload is too large or writing fails.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge(payload.len()));
    }

    #[allow(clippy::cast_possible_truncation)]
    let prefix = (payload.len() as u32).to_be_bytes();

    writer.write_all(&prefix).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;

    Ok(())
}

/// Serialize `message` and write it as one frame.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let payload = encode_payload(message)?;
    write_frame(writer, &payload).await
}

/// Read one frame and deserialize it.
///
/// # Errors
///
/// Returns an error if reading fails or the payload is not valid JSON for `T`.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncReadExt + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let payload = read_frame(reader).await?;
    decode_payload(&payload)
}

async fn read_exact_or_closed<R>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()>
where
    R: AsyncReadExt + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::ConnectionClosed(
            format!("stream ended while reading {what}"),
        )),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::FileInfo;

    fn sample_frame() -> MetadataFrame {
        let mut files = FileManifest::new();
        files.insert(
            "a1".to_string(),
            FileInfo {
                path: "/data/notes.txt".to_string(),
                name: "notes.txt".to_string(),
                size: 10,
                chunk_count: 1,
                checksum: "abc".to_string(),
            },
        );
        files.insert(
            "b2".to_string(),
            FileInfo {
                path: "/data/photo.jpg".to_string(),
                name: "photo.jpg".to_string(),
                size: 16385,
                chunk_count: 3,
                checksum: "def".to_string(),
            },
        );
        MetadataFrame {
            session_id: "jt0000000000000000".to_string(),
            files,
            total_size: 16395,
        }
    }

    #[tokio::test]
    async fn test_length_prefix_is_big_endian() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"{}").await.expect("write frame");
        assert_eq!(&buffer[..4], &[0, 0, 0, 2]);
        assert_eq!(&buffer[4..], b"{}");
    }

    #[tokio::test]
    async fn test_metadata_frame_wire_shape() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, &sample_frame())
            .await
            .expect("write message");

        let json: serde_json::Value =
            serde_json::from_slice(&buffer[4..]).expect("payload is json");
        assert_eq!(json["session_id"], "jt0000000000000000");
        assert_eq!(json["total_size"], 16395);
        assert_eq!(json["files"]["b2"]["chunks"], 3);
        assert_eq!(json["files"]["a1"]["name"], "notes.txt");

        let mut cursor = std::io::Cursor::new(buffer);
        let parsed: MetadataFrame = read_message(&mut cursor).await.expect("read message");
        assert_eq!(parsed, sample_frame());
    }

    #[tokio::test]
    async fn test_short_payload_is_connection_closed() {
        let mut buffer = 100u32.to_be_bytes().to_vec();
        buffer.extend_from_slice(b"{\"partial\":");

        let mut cursor = std::io::Cursor::new(buffer);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(Error::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_short_prefix_is_connection_closed() {
        let mut cursor = std::io::Cursor::new(vec![0u8, 0]);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(Error::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_oversized_prefix_rejected() {
        let buffer = u32::MAX.to_be_bytes().to_vec();
        let mut cursor = std::io::Cursor::new(buffer);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(Error::FrameTooLarge(_))));
    }

    #[tokio::test]
    async fn test_invalid_json_is_serialization_error() {
        let mut buffer = Vec::new();
        write_frame(&mut buffer, b"not json").await.expect("write frame");

        let mut cursor = std::io::Cursor::new(buffer);
        let result: Result<MetadataFrame> = read_message(&mut cursor).await;
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_validate_session_mismatch() {
        let frame = sample_frame();
        assert!(frame.validate("jt0000000000000000").is_ok());
        assert!(matches!(
            frame.validate("jt1111111111111111"),
            Err(Error::SessionMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_total_size() {
        let mut frame = sample_frame();
        frame.total_size = 1;
        assert!(matches!(
            frame.validate("jt0000000000000000"),
            Err(Error::ProtocolError(_))
        ));
    }
}
