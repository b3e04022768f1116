//! Storage provider for uploaded files and extracted covers.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::security;

/// Relative, `/`-separated location inside a storage provider.
///
/// Construction rejects absolute paths and `..`, so a key can never name
/// anything outside the provider's root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(key: impl Into<String>) -> Result<Self, StorageError> {
        let key = key.into();
        let segments: Vec<&str> = key.split('/').collect();
        Self::from_segments(&segments).ok_or(StorageError::AccessDenied(key))
    }

    /// Join path segments into a key. `None` if any segment is empty, `.`,
    /// `..`, or contains a separator.
    pub fn from_segments(segments: &[&str]) -> Option<Self> {
        if segments.is_empty() {
            return None;
        }
        for segment in segments {
            if segment.is_empty()
                || *segment == "."
                || segment.contains(|c| c == '/' || c == '\\')
                || security::check_path_traversal(segment).is_err()
            {
                return None;
            }
        }
        Some(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StorageKey {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StorageKey> for String {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}

pub trait StorageProvider {
    fn exists(&self, key: &StorageKey) -> bool;

    fn read(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError>;

    fn write(&self, key: &StorageKey, bytes: &[u8]) -> Result<(), StorageError>;

    /// Map a stored file path (split into segments) back to a key.
    /// `None` when the path would leave the storage root.
    fn resolve_key_from_path(&self, segments: &[&str]) -> Option<StorageKey>;
}

/// Directory-backed storage. Keys map to paths under `root`.
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key to a path that stays under root after symlinks are
    /// followed. The deepest part of the path already on disk is checked,
    /// so writes of new files through a linked directory are refused too.
    fn safe_path(&self, key: &StorageKey) -> Result<PathBuf, StorageError> {
        let path = key.segments().fold(self.root.clone(), |p, s| p.join(s));
        let denied = || StorageError::AccessDenied(key.to_string());

        // symlink_metadata so a dangling link counts as present.
        let Some(existing) = path
            .ancestors()
            .take_while(|p| p.starts_with(&self.root))
            .find(|p| p.symlink_metadata().is_ok())
        else {
            return Ok(path);
        };

        let canonical_root = self.root.canonicalize().map_err(|_| denied())?;
        let canonical = existing.canonicalize().map_err(|_| denied())?;
        if !canonical.starts_with(&canonical_root) {
            return Err(denied());
        }
        Ok(path)
    }
}

impl StorageProvider for DirStorage {
    fn exists(&self, key: &StorageKey) -> bool {
        self.safe_path(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let path = self.safe_path(key)?;
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            std::io::ErrorKind::PermissionDenied => StorageError::AccessDenied(key.to_string()),
            _ => StorageError::Io(e),
        })
    }

    fn write(&self, key: &StorageKey, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.safe_path(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        tracing::debug!("Stored {} bytes at {}", bytes.len(), key);
        Ok(())
    }

    fn resolve_key_from_path(&self, segments: &[&str]) -> Option<StorageKey> {
        let key = StorageKey::from_segments(segments)?;
        self.safe_path(&key).ok().map(|_| key)
    }
}
