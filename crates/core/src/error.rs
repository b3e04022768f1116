/// Top-level error type. The orchestration layer (`library`) returns this.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Duplicate detection error: {0}")]
    Dedup(#[from] DedupError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The source file and record were stored but its chapter rows were
    /// only partly written. `source_id` names what the caller must clean up.
    #[error("Chapters of source {source_id} were not fully persisted: {cause}")]
    ChaptersIncomplete {
        source_id: uuid::Uuid,
        #[source]
        cause: RepositoryError,
    },

    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("ZIP bomb detected: decompression ratio {ratio}:1 exceeds limit {limit}:1")]
    ZipBomb { ratio: u64, limit: u64 },

    #[error("Path traversal detected: {path}")]
    PathTraversal { path: String },

    #[error("Archive contains {count} files, exceeding limit of {limit}")]
    TooManyFiles { count: u64, limit: u64 },

    #[error("Resource {name} is {size_mb}MB, exceeding limit of {limit_mb}MB")]
    OversizedResource {
        name: String,
        size_mb: u64,
        limit_mb: u64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Corrupt archive: {0}")]
    Corrupt(String),

    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),

    #[error(transparent)]
    LimitExceeded(#[from] SecurityError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structural problems in package or navigation documents. These are
/// recovered at parse time; see `ingest::parse_container`.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed package document: {0}")]
    MalformedManifest(String),

    #[error("Malformed navigation document: {0}")]
    MalformedNavigation(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Invalid asset path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Archive(ArchiveError),
}

impl From<ArchiveError> for ExtractError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::EntryNotFound(path) => ExtractError::EntryNotFound(path),
            other => ExtractError::Archive(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage key not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Repository backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("Duplicate detection failed: {0}")]
    Repository(#[from] RepositoryError),
}
