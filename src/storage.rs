//! Key-value persistence port and key layout.
//!
//! DESIGN
//! ======
//! The annotation store reads and writes whole serialized documents under
//! per-plan keys. It never sees where they live: the host injects a
//! [`KeyValueStore`]. Two implementations ship with the crate, an in-memory
//! map for tests and embedding, and a directory of files for the CLI.
//!
//! There is no locking or version token. Two writers on the same plan clobber
//! each other; the last write wins.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::consts::{ANNOTATIONS_PREFIX, LEGACY_ANNOTATIONS_PREFIX, METADATA_OPTIONS_PREFIX};
use crate::error::ErrorCode;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
    #[error("storage io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

impl ErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "E_STORAGE_KEY",
            Self::Io { .. } => "E_STORAGE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Persistence port. Values are opaque serialized documents.
pub trait KeyValueStore {
    /// Value under `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] when the backing medium cannot be written.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

// =============================================================================
// KEY LAYOUT
// =============================================================================

/// `annotations:<planId>`: the serialized annotation graph.
#[must_use]
pub fn annotations_key(plan_id: &str) -> String {
    format!("{ANNOTATIONS_PREFIX}:{plan_id}")
}

/// `metadataOptions:<planId>`: the serialized option set.
#[must_use]
pub fn metadata_options_key(plan_id: &str) -> String {
    format!("{METADATA_OPTIONS_PREFIX}:{plan_id}")
}

/// `lineGroups:<planId>`: where older builds kept the graph.
#[must_use]
pub fn legacy_annotations_key(plan_id: &str) -> String {
    format!("{LEGACY_ANNOTATIONS_PREFIX}:{plan_id}")
}

// =============================================================================
// MEMORY STORE
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// One file per key under a root directory. Writes go through a temporary
/// file and a rename, so a reader never sees a half-written document.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.trim().is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{}.json", encode_key(key))))
    }
}

/// Percent-encode everything outside `[A-Za-z0-9._-]`.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn io_error(key: &str, source: io::Error) -> StorageError {
    StorageError::Io { key: key.to_string(), source }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(key, e)),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).map_err(|e| io_error(key, e))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(|e| io_error(key, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(key, e))?;
        debug!(key, bytes = value.len(), path = %path.display(), "stored document");
        Ok(())
    }
}
