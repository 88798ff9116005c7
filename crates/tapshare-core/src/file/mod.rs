//! File operations for TapShare.
//!
//! This module handles:
//! - Chunk accounting for the fixed 8 KB transfer unit
//! - Reading files into checksummed chunks
//! - Sanitizing peer-supplied file names before they touch the disk
//! - Size formatting for progress output

use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncReadExt;

use crate::checksum::{checksum_bytes, ChecksumAlgorithm};
use crate::error::{Error, Result};
use crate::CHUNK_SIZE;

/// Characters replaced by `_` when sanitizing a file name.
const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Name used when sanitizing leaves nothing behind.
const FALLBACK_FILENAME: &str = "unnamed_file";

/// Number of chunks a file of `size` bytes is accounted as.
///
/// This is `floor(size / CHUNK_SIZE) + 1`, so an exact multiple of the chunk
/// size still counts a trailing (empty) chunk.
#[must_use]
pub const fn chunk_count(size: u64) -> u64 {
    size / CHUNK_SIZE as u64 + 1
}

/// A unit of file data plus its own digest.
///
/// Chunks are transient: the direct transport streams raw bytes and never
/// puts per-chunk digests on the wire.
#[derive(Debug, Clone)]
pub struct FileChunk {
    /// Identifier of the file this chunk belongs to
    pub file_id: String,
    /// Chunk index within the file
    pub chunk_id: u64,
    /// Chunk data
    pub data: Vec<u8>,
    /// Total chunks accounted for the file
    pub total_chunks: u64,
    /// MD5 digest of `data`
    pub checksum: String,
}

impl FileChunk {
    /// Create a chunk, computing its digest.
    #[must_use]
    pub fn new(file_id: impl Into<String>, chunk_id: u64, data: Vec<u8>, total_chunks: u64) -> Self {
        let checksum = checksum_bytes(&data, ChecksumAlgorithm::Md5);
        Self {
            file_id: file_id.into(),
            chunk_id,
            data,
            total_chunks,
            checksum,
        }
    }

    /// Check the chunk data against its recorded digest.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        checksum_bytes(&self.data, ChecksumAlgorithm::Md5).eq_ignore_ascii_case(&self.checksum)
    }
}

/// Read a whole file into [`FileChunk`]s of [`CHUNK_SIZE`] bytes.
///
/// An empty file produces no chunks.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub async fn read_chunks(path: &Path, file_id: &str) -> Result<Vec<FileChunk>> {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    let total_chunks = chunk_count(size);

    let mut chunks = Vec::new();
    let mut chunk_id = 0;

    loop {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let filled = read_full(&mut file, &mut buffer).await?;
        if filled == 0 {
            break;
        }
        buffer.truncate(filled);
        chunks.push(FileChunk::new(file_id, chunk_id, buffer, total_chunks));
        chunk_id += 1;
    }

    Ok(chunks)
}

/// Fill `buf` as far as the reader allows, returning the bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncReadExt + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Sanitize a file name for safe storage.
///
/// Replaces reserved characters with `_`, strips leading and trailing
/// spaces and dots, and falls back to `unnamed_file` when nothing is left.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_FILENAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resolve a peer-supplied file name to a path inside `dir`.
///
/// The name is sanitized first; anything that would still escape `dir`
/// (or resolve to `dir` itself) is rejected.
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] if the name cannot be made safe.
pub fn safe_destination(dir: &Path, name: &str) -> Result<PathBuf> {
    let sanitized = sanitize_filename(name);
    let relative = Path::new(&sanitized);

    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(Error::InvalidPath(name.to_string())),
    }

    let full_path = dir.join(relative);
    if full_path.parent() == Some(dir) {
        Ok(full_path)
    } else {
        Err(Error::InvalidPath(name.to_string()))
    }
}

/// Format a file size for display.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
