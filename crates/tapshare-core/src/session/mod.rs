//! Transfer sessions.
//!
//! A [`TransferSession`] describes one logical transfer: the identifier both
//! peers agreed on, the files to move, their metadata and the running byte
//! counter used for progress. Sessions live in a [`SessionRegistry`] owned
//! by the [`PeerManager`](crate::PeerManager).
//!
//! ## File Metadata
//!
//! Each file is keyed by a file id, the MD5 of its absolute path. The id is
//! independent of content and stable for the life of the session. Metadata
//! is kept in insertion order, which is the order files go on the wire:
//!
//! ```json
//! {
//!   "9b2f...": {"path": "/home/a/x.txt", "name": "x.txt", "size": 10, "chunks": 1, "checksum": "..."}
//! }
//! ```

mod id;
mod registry;

pub use id::{ensure_usable, generate_session_id, is_valid_session_id};
pub use registry::SessionRegistry;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::checksum::{checksum_bytes, file_checksum, ChecksumAlgorithm};
use crate::error::{Error, Result};
use crate::file::chunk_count;

/// Default size ceiling above which files are not checksummed (2 GB).
pub const DEFAULT_CHECKSUM_SIZE_LIMIT: u64 = 2 * 1024 * 1024 * 1024;

/// Derive the file id for an absolute path.
#[must_use]
pub fn file_id_for(path: &Path) -> String {
    checksum_bytes(
        path.to_string_lossy().as_bytes(),
        ChecksumAlgorithm::Md5,
    )
}

/// Metadata for one file in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Absolute path on the sending host
    pub path: String,
    /// File name (last path component)
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// Chunks accounted for the file
    #[serde(rename = "chunks")]
    pub chunk_count: u64,
    /// Whole-file MD5, empty when not computed
    #[serde(default)]
    pub checksum: String,
}

impl FileInfo {
    /// Expected digest, if one was recorded.
    #[must_use]
    pub fn expected_checksum(&self) -> Option<&str> {
        Some(self.checksum.as_str()).filter(|c| !c.is_empty())
    }
}

/// Ordered mapping from file id to [`FileInfo`].
///
/// Serialized as a JSON object whose key order is the transfer order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileManifest {
    entries: Vec<(String, FileInfo)>,
    index: HashMap<String, usize>,
}

impl FileManifest {
    /// Create an empty manifest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns `false` if the id is already present.
    pub fn insert(&mut self, file_id: String, info: FileInfo) -> bool {
        if self.index.contains_key(&file_id) {
            return false;
        }
        self.index.insert(file_id.clone(), self.entries.len());
        self.entries.push((file_id, info));
        true
    }

    /// Look up an entry by file id.
    #[must_use]
    pub fn get(&self, file_id: &str) -> Option<&FileInfo> {
        self.index
            .get(file_id)
            .map(|&position| &self.entries[position].1)
    }

    /// Iterate entries in transfer order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileInfo)> {
        self.entries.iter().map(|(id, info)| (id.as_str(), info))
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all declared sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|(_, info)| info.size).sum()
    }
}

impl Serialize for FileManifest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, info) in &self.entries {
            map.serialize_entry(id, info)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FileManifest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ManifestVisitor;

        impl<'de> Visitor<'de> for ManifestVisitor {
            type Value = FileManifest;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of file id to file metadata")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut manifest = FileManifest::new();
                while let Some((id, info)) = access.next_entry::<String, FileInfo>()? {
                    if !manifest.insert(id.clone(), info) {
                        return Err(serde::de::Error::custom(format!("duplicate file id {id}")));
                    }
                }
                Ok(manifest)
            }
        }

        deserializer.deserialize_map(ManifestVisitor)
    }
}

/// Options controlling how session metadata is computed.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    /// Files larger than this are recorded without a checksum
    pub checksum_size_limit: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            checksum_size_limit: DEFAULT_CHECKSUM_SIZE_LIMIT,
        }
    }
}

/// A file that could not be included in a session.
#[derive(Debug)]
pub struct SkippedFile {
    /// Path as supplied by the caller
    pub path: PathBuf,
    /// Why it was skipped
    pub reason: Error,
}

/// One logical transfer between two peers.
#[derive(Debug)]
pub struct TransferSession {
    session_id: String,
    files: Vec<PathBuf>,
    manifest: FileManifest,
    total_size: u64,
    transferred_size: AtomicU64,
    is_active: AtomicBool,
    skipped: Vec<SkippedFile>,
    created_at: Instant,
}

impl TransferSession {
    /// Build a session by statting and checksumming each file.
    ///
    /// Files that cannot be read are left out of the metadata and listed in
    /// [`skipped_files`](Self::skipped_files); they never fail the session.
    ///
    /// # Errors
    ///
    /// Returns an error only if the session id is unusable.
    pub async fn create(
        session_id: &str,
        files: &[PathBuf],
        options: SessionOptions,
    ) -> Result<Self> {
        ensure_usable(session_id)?;

        let mut manifest = FileManifest::new();
        let mut skipped = Vec::new();

        for path in files {
            match describe_file(path, options).await {
                Ok((file_id, info)) => {
                    let name = info.name.clone();
                    if !manifest.insert(file_id, info) {
                        tracing::warn!("Skipping duplicate file {}", path.display());
                        skipped.push(SkippedFile {
                            path: path.clone(),
                            reason: Error::InvalidPath(format!("duplicate entry {name}")),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    skipped.push(SkippedFile {
                        path: path.clone(),
                        reason: e,
                    });
                }
            }
        }

        let total_size = manifest.total_size();

        Ok(Self {
            session_id: session_id.to_string(),
            files: files.to_vec(),
            manifest,
            total_size,
            transferred_size: AtomicU64::new(0),
            is_active: AtomicBool::new(false),
            skipped,
            created_at: Instant::now(),
        })
    }

    /// Get the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Get the files as supplied at creation.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Get the per-file metadata in transfer order.
    #[must_use]
    pub fn manifest(&self) -> &FileManifest {
        &self.manifest
    }

    /// Files left out of the metadata.
    #[must_use]
    pub fn skipped_files(&self) -> &[SkippedFile] {
        &self.skipped
    }

    /// Sum of all file sizes in the metadata.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bytes moved so far in the current operation.
    #[must_use]
    pub fn transferred_size(&self) -> u64 {
        self.transferred_size.load(Ordering::Acquire)
    }

    /// Whether a transport operation is bound to this session.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Acquire)
    }

    /// When the session was created.
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Progress of the current operation as a percentage (0.0 - 100.0).
    #[must_use]
    pub fn progress_percentage(&self) -> f64 {
        percentage(self.transferred_size(), self.total_size)
    }

    /// Bind a transport operation to this session.
    ///
    /// Resets the transferred counter. The session stays active until the
    /// returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionBusy`] if another operation holds the session.
    pub fn begin_operation(&self) -> Result<OperationGuard<'_>> {
        if self
            .is_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::SessionBusy(self.session_id.clone()));
        }
        self.transferred_size.store(0, Ordering::Release);
        Ok(OperationGuard { session: self })
    }

    fn add_transferred(&self, bytes: u64) -> u64 {
        self.transferred_size.fetch_add(bytes, Ordering::AcqRel) + bytes
    }
}

/// Marks a session active for the duration of one transport operation.
#[derive(Debug)]
pub struct OperationGuard<'a> {
    session: &'a TransferSession,
}

impl OperationGuard<'_> {
    /// Record `bytes` moved and return the new running total.
    pub fn record(&self, bytes: u64) -> u64 {
        self.session.add_transferred(bytes)
    }

    /// The session this operation is bound to.
    #[must_use]
    pub fn session(&self) -> &TransferSession {
        self.session
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.session.is_active.store(false, Ordering::Release);
    }
}

/// Percentage of `done` over `total`, reporting 100 for an empty total.
#[must_use]
pub fn percentage(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 / total as f64) * 100.0
    }
}

async fn describe_file(path: &Path, options: SessionOptions) -> Result<(String, FileInfo)> {
    let absolute = std::path::absolute(path)?;

    let metadata = tokio::fs::metadata(&absolute)
        .await
        .map_err(|_| Error::FileNotFound(absolute.display().to_string()))?;
    if !metadata.is_file() {
        return Err(Error::InvalidPath(format!(
            "{} is not a regular file",
            absolute.display()
        )));
    }

    let size = metadata.len();
    let name = absolute
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::InvalidPath(absolute.display().to_string()))?;

    let checksum = if size > options.checksum_size_limit {
        tracing::debug!("Not checksumming {} ({} bytes)", absolute.display(), size);
        String::new()
    } else {
        match file_checksum(&absolute).await {
            Ok(digest) => digest,
            Err(e) => {
                tracing::error!("Error calculating checksum for {}: {}", absolute.display(), e);
                String::new()
            }
        }
    };

    let info = FileInfo {
        path: absolute.to_string_lossy().to_string(),
        name,
        size,
        chunk_count: chunk_count(size),
        checksum,
    };

    Ok((file_id_for(&absolute), info))
}
