//! Archive hardening: ZIP bomb protection, path traversal guards, entry limits.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use crate::error::SecurityError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityLimits {
    /// Maximum decompression ratio before flagging as ZIP bomb.
    pub max_compression_ratio: u64,
    /// Maximum number of entries allowed in an archive.
    pub max_file_count: u64,
    /// Maximum size of a single decompressed entry in bytes.
    pub max_resource_size_bytes: u64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_compression_ratio: 100,
            max_file_count: 10_000,
            max_resource_size_bytes: 200 * 1024 * 1024, // 200 MB
        }
    }
}

/// Reject absolute paths and `..` components.
///
/// Used for asset paths coming back from clients and for storage keys; both
/// must stay inside the archive or the storage root respectively.
pub fn check_path_traversal(path: &str) -> Result<(), SecurityError> {
    let traversal = || SecurityError::PathTraversal {
        path: path.to_string(),
    };

    if path.starts_with('/') || path.starts_with('\\') {
        return Err(traversal());
    }

    // Windows drive prefixes (e.g. C:\)
    if path.len() >= 2 && path.as_bytes()[1] == b':' {
        return Err(traversal());
    }

    if path.split(|c| c == '/' || c == '\\').any(|segment| segment == "..") {
        return Err(traversal());
    }

    for component in Path::new(path).components() {
        if matches!(component, Component::ParentDir | Component::RootDir | Component::Prefix(_)) {
            return Err(traversal());
        }
    }

    Ok(())
}

/// Check if a decompression ratio exceeds the configured limit (ZIP bomb detection).
pub fn check_compression_ratio(
    compressed_size: u64,
    uncompressed_size: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if compressed_size == 0 {
        if uncompressed_size > 0 {
            return Err(SecurityError::ZipBomb {
                ratio: u64::MAX,
                limit: limits.max_compression_ratio,
            });
        }
        return Ok(());
    }

    let ratio = uncompressed_size / compressed_size;
    if ratio > limits.max_compression_ratio {
        return Err(SecurityError::ZipBomb {
            ratio,
            limit: limits.max_compression_ratio,
        });
    }

    Ok(())
}

pub fn check_file_count(count: u64, limits: &SecurityLimits) -> Result<(), SecurityError> {
    if count > limits.max_file_count {
        return Err(SecurityError::TooManyFiles {
            count,
            limit: limits.max_file_count,
        });
    }
    Ok(())
}

pub fn check_resource_size(
    name: &str,
    size_bytes: u64,
    limits: &SecurityLimits,
) -> Result<(), SecurityError> {
    if size_bytes > limits.max_resource_size_bytes {
        return Err(SecurityError::OversizedResource {
            name: name.to_string(),
            size_mb: size_bytes / (1024 * 1024),
            limit_mb: limits.max_resource_size_bytes / (1024 * 1024),
        });
    }
    Ok(())
}
