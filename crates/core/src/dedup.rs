//! Duplicate detection by content digest, with lazy backfill for records
//! stored before digests were recorded.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::DedupError;
use crate::repository::{SourceRecord, SourceRepository};
use crate::storage::StorageProvider;

/// Lowercase hex SHA-256 of a file's bytes.
///
/// Equal digests are treated as equal content; there is no byte-level
/// comparison behind a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Accept a stored digest string (64 hex digits, any case).
    pub fn parse(hex: &str) -> Option<Self> {
        (hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .then(|| Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("not a SHA-256 hex digest: {value:?}"))
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn compute_digest(bytes: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    ContentDigest(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    Duplicate(SourceRecord),
    Unique,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The stored path does not map to a storage key.
    AccessDenied,
    Unreadable(String),
    PersistFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    Hashed(ContentDigest),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillEntry {
    pub source_id: Uuid,
    pub file_path: String,
    pub status: BackfillStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    pub entries: Vec<BackfillEntry>,
}

impl BackfillReport {
    /// Sources that received a digest in this pass.
    pub fn hashed(&self) -> impl Iterator<Item = (Uuid, &ContentDigest)> {
        self.entries.iter().filter_map(|e| match &e.status {
            BackfillStatus::Hashed(digest) => Some((e.source_id, digest)),
            BackfillStatus::Skipped(_) => None,
        })
    }

    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, BackfillStatus::Skipped(_)))
            .count()
    }
}

/// Compute and store digests for the owner's unhashed records.
///
/// Candidates are processed one at a time; a candidate whose file cannot
/// be located, read or updated is skipped and reported, and the scan goes
/// on. Only a failure to list candidates aborts.
pub fn backfill_digests<R, S>(
    repo: &mut R,
    storage: &S,
    owner: &str,
    size_filter: Option<u64>,
) -> Result<BackfillReport, DedupError>
where
    R: SourceRepository + ?Sized,
    S: StorageProvider + ?Sized,
{
    let candidates = repo.find_unhashed(owner, size_filter)?;
    let mut report = BackfillReport::default();

    for record in candidates {
        let status = backfill_one(repo, storage, &record);
        if let BackfillStatus::Skipped(ref reason) = status {
            tracing::warn!("Skipping digest backfill for {} ({}): {:?}", record.id, record.file_path, reason);
        }
        report.entries.push(BackfillEntry {
            source_id: record.id,
            file_path: record.file_path,
            status,
        });
    }

    tracing::debug!(
        "Backfilled digests for owner {}: {} hashed, {} skipped",
        owner,
        report.hashed().count(),
        report.skipped()
    );
    Ok(report)
}

fn backfill_one<R, S>(repo: &mut R, storage: &S, record: &SourceRecord) -> BackfillStatus
where
    R: SourceRepository + ?Sized,
    S: StorageProvider + ?Sized,
{
    let segments: Vec<&str> = record.file_path.split('/').collect();
    let Some(key) = storage.resolve_key_from_path(&segments) else {
        return BackfillStatus::Skipped(SkipReason::AccessDenied);
    };
    let bytes = match storage.read(&key) {
        Ok(bytes) => bytes,
        Err(e) => return BackfillStatus::Skipped(SkipReason::Unreadable(e.to_string())),
    };
    let digest = compute_digest(&bytes);
    match repo.set_hash(record.id, &digest) {
        Ok(()) => BackfillStatus::Hashed(digest),
        Err(e) => BackfillStatus::Skipped(SkipReason::PersistFailed(e.to_string())),
    }
}

/// Find an existing record of `owner` with the same content.
///
/// Records that already carry a digest are checked first. Failing that,
/// unhashed records of exactly `size` bytes are backfilled and compared.
pub fn match_existing_by_digest<R, S>(
    repo: &mut R,
    storage: &S,
    owner: &str,
    digest: &ContentDigest,
    size: u64,
) -> Result<DedupOutcome, DedupError>
where
    R: SourceRepository + ?Sized,
    S: StorageProvider + ?Sized,
{
    if let Some(existing) = repo.find_by_hash(owner, digest)? {
        return Ok(DedupOutcome::Duplicate(existing));
    }

    let report = backfill_digests(repo, storage, owner, Some(size))?;
    let matched = report.hashed().find(|(_, d)| *d == digest).map(|(id, _)| id);
    match matched {
        Some(id) => Ok(DedupOutcome::Duplicate(repo.get_source(id)?)),
        None => Ok(DedupOutcome::Unique),
    }
}
