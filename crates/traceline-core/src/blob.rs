//! # Blob Storage
//!
//! Content-addressed payload storage behind the lineage graph. The graph
//! records WHAT an artifact is (hash, path, events); a [`BlobStore`] holds
//! the bytes themselves, keyed by hash, so the same content stored from any
//! number of executions occupies one slot.

use crate::fingerprint::fingerprint;
use crate::{ContentHash, LineageError};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Content-addressed byte storage.
///
/// Implementations must make `put` idempotent: storing bytes that hash to an
/// already-present key is a no-op, never an overwrite.
pub trait BlobStore {
    /// Store `bytes` under their own hash and return it.
    ///
    /// Returns [`LineageError::HashMismatch`] if `expected` is given and the
    /// bytes do not hash to it.
    fn put(&mut self, bytes: &[u8], expected: Option<ContentHash>)
    -> Result<ContentHash, LineageError>;

    /// Fetch the bytes for a hash, verifying content on the way out.
    fn get(&self, hash: ContentHash) -> Result<Vec<u8>, LineageError>;

    /// Whether a blob is present without fetching it.
    fn contains(&self, hash: ContentHash) -> bool;
}

fn check_expected(
    actual: ContentHash,
    expected: Option<ContentHash>,
) -> Result<(), LineageError> {
    match expected {
        Some(e) if e != actual => Err(LineageError::HashMismatch {
            expected: e,
            actual,
        }),
        _ => Ok(()),
    }
}

/// In-memory blob store, for sites that only track lineage metadata and for
/// tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: BTreeMap<ContentHash, Vec<u8>>,
}

impl MemoryBlobStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blobs held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// True when no blobs are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(
        &mut self,
        bytes: &[u8],
        expected: Option<ContentHash>,
    ) -> Result<ContentHash, LineageError> {
        let hash = fingerprint(bytes);
        check_expected(hash, expected)?;
        self.blobs.entry(hash).or_insert_with(|| bytes.to_vec());
        Ok(hash)
    }

    fn get(&self, hash: ContentHash) -> Result<Vec<u8>, LineageError> {
        self.blobs
            .get(&hash)
            .cloned()
            .ok_or(LineageError::BlobMissing(hash))
    }

    fn contains(&self, hash: ContentHash) -> bool {
        self.blobs.contains_key(&hash)
    }
}

/// Filesystem blob store: one file per blob under `root`, named by hex hash,
/// fanned out by the first hash byte to keep directories small.
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Use `root` as the blob directory, creating it if absent.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, LineageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| LineageError::Io(e.to_string()))?;
        Ok(Self { root })
    }

    fn blob_path(&self, hash: ContentHash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join(&hex[..2]).join(&hex)
    }
}

impl BlobStore for FileBlobStore {
    fn put(
        &mut self,
        bytes: &[u8],
        expected: Option<ContentHash>,
    ) -> Result<ContentHash, LineageError> {
        let hash = fingerprint(bytes);
        check_expected(hash, expected)?;
        let path = self.blob_path(hash);
        if path.exists() {
            return Ok(hash);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| LineageError::Io(e.to_string()))?;
        }
        // Write to a temp name then rename, so a torn write never leaves a
        // half-blob under its final name.
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| LineageError::Io(e.to_string()))?;
        file.write_all(bytes)
            .map_err(|e| LineageError::Io(e.to_string()))?;
        file.sync_all().map_err(|e| LineageError::Io(e.to_string()))?;
        fs::rename(&tmp, &path).map_err(|e| LineageError::Io(e.to_string()))?;
        Ok(hash)
    }

    fn get(&self, hash: ContentHash) -> Result<Vec<u8>, LineageError> {
        let path = self.blob_path(hash);
        let bytes = fs::read(&path).map_err(|_| LineageError::BlobMissing(hash))?;
        let actual = fingerprint(&bytes);
        if actual != hash {
            return Err(LineageError::HashMismatch {
                expected: hash,
                actual,
            });
        }
        Ok(bytes)
    }

    fn contains(&self, hash: ContentHash) -> bool {
        self.blob_path(hash).exists()
    }
}

// =============================================================================
// TESTS
// =============================================================================
