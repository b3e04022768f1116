//! Persistence collaborators: source records and chapter rows.
//!
//! The relational layer lives outside this crate; these traits are the
//! surface the ingestion pipeline needs from it. [`MemoryRepository`] is a
//! complete in-process implementation used by tests and the CLI.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dedup::ContentDigest;
use crate::detect::SourceKind;
use crate::error::RepositoryError;
use crate::normalize::ChapterRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: Uuid,
    pub owner: String,
    pub kind: SourceKind,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Storage location of the uploaded bytes, `/`-separated.
    pub file_path: String,
    /// Missing on rows created before digests were recorded.
    pub file_hash: Option<ContentDigest>,
    pub file_size: u64,
    pub cover_path: Option<String>,
}

pub trait SourceRepository {
    fn insert_source(&mut self, record: SourceRecord) -> Result<(), RepositoryError>;

    fn get_source(&self, id: Uuid) -> Result<SourceRecord, RepositoryError>;

    /// The owner's record with this digest, if any.
    fn find_by_hash(
        &self,
        owner: &str,
        digest: &ContentDigest,
    ) -> Result<Option<SourceRecord>, RepositoryError>;

    /// The owner's records without a digest, optionally only those of
    /// exactly `size` bytes.
    fn find_unhashed(
        &self,
        owner: &str,
        size: Option<u64>,
    ) -> Result<Vec<SourceRecord>, RepositoryError>;

    fn set_hash(&mut self, id: Uuid, digest: &ContentDigest) -> Result<(), RepositoryError>;
}

pub trait ChapterSink {
    fn insert_chapter(&mut self, row: &ChapterRow) -> Result<(), RepositoryError>;
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    sources: Vec<SourceRecord>,
    chapters: Vec<ChapterRow>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sources(&self) -> &[SourceRecord] {
        &self.sources
    }

    /// Chapter rows of a source in insertion order.
    pub fn chapters_for(&self, source_id: Uuid) -> Vec<&ChapterRow> {
        self.chapters.iter().filter(|c| c.source_id == source_id).collect()
    }
}

impl SourceRepository for MemoryRepository {
    fn insert_source(&mut self, record: SourceRecord) -> Result<(), RepositoryError> {
        if self.sources.iter().any(|s| s.id == record.id) {
            return Err(RepositoryError::Conflict(record.id.to_string()));
        }
        self.sources.push(record);
        Ok(())
    }

    fn get_source(&self, id: Uuid) -> Result<SourceRecord, RepositoryError> {
        self.sources
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    fn find_by_hash(
        &self,
        owner: &str,
        digest: &ContentDigest,
    ) -> Result<Option<SourceRecord>, RepositoryError> {
        Ok(self
            .sources
            .iter()
            .find(|s| s.owner == owner && s.file_hash.as_ref() == Some(digest))
            .cloned())
    }

    fn find_unhashed(
        &self,
        owner: &str,
        size: Option<u64>,
    ) -> Result<Vec<SourceRecord>, RepositoryError> {
        Ok(self
            .sources
            .iter()
            .filter(|s| s.owner == owner && s.file_hash.is_none())
            .filter(|s| size.map_or(true, |size| s.file_size == size))
            .cloned()
            .collect())
    }

    fn set_hash(&mut self, id: Uuid, digest: &ContentDigest) -> Result<(), RepositoryError> {
        let record = self
            .sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        record.file_hash = Some(digest.clone());
        Ok(())
    }
}

impl ChapterSink for MemoryRepository {
    /// Rejects rows whose parent has not been inserted for the same source.
    fn insert_chapter(&mut self, row: &ChapterRow) -> Result<(), RepositoryError> {
        if self.chapters.iter().any(|c| c.id == row.id) {
            return Err(RepositoryError::Conflict(row.id.to_string()));
        }
        if let Some(parent) = row.parent_id {
            let known = self
                .chapters
                .iter()
                .any(|c| c.id == parent && c.source_id == row.source_id);
            if !known {
                return Err(RepositoryError::NotFound(format!("parent chapter {parent}")));
            }
        }
        self.chapters.push(row.clone());
        Ok(())
    }
}
