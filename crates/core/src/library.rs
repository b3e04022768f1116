//! Upload and read orchestration over a storage provider and a repository.
//!
//! A [`Library`] owns the two collaborators and runs the full pipeline:
//!
//! - **upload**: extension gate, digest and duplicate check, store the bytes,
//!   parse, store the cover, insert the source record, persist the TOC.
//! - **read**: load the stored bytes of a source and extract a chapter or an
//!   embedded asset from them. Nothing is cached between calls.

use std::path::Path;

use serde::Serialize;
use uuid::Uuid;

use crate::dedup::{self, BackfillReport, DedupOutcome};
use crate::detect::SourceKind;
use crate::error::{IngestError, StorageError};
use crate::extract::{self, Asset, ExtractOptions};
use crate::ingest::{self, ParseOptions};
use crate::mime;
use crate::normalize::{self, ChapterRow};
use crate::repository::{ChapterSink, SourceRecord, SourceRepository};
use crate::storage::{StorageKey, StorageProvider};

pub const UPLOADS_DIR: &str = "uploads";
pub const COVERS_DIR: &str = "covers";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Created {
        source: SourceRecord,
        chapters: Vec<ChapterRow>,
    },
    /// The owner already has a source with identical content; nothing was
    /// stored.
    Duplicate { existing: SourceRecord },
}

pub struct Library<S, R> {
    storage: S,
    repo: R,
    parse: ParseOptions,
    extract: ExtractOptions,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

impl<S, R> Library<S, R>
where
    S: StorageProvider,
    R: SourceRepository + ChapterSink,
{
    pub fn new(storage: S, repo: R) -> Self {
        Self {
            storage,
            repo,
            parse: ParseOptions::default(),
            extract: ExtractOptions::default(),
        }
    }

    pub fn with_options(mut self, parse: ParseOptions, extract: ExtractOptions) -> Self {
        self.parse = parse;
        self.extract = extract;
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Store and register an upload.
    ///
    /// Nothing is rolled back on failure. If persisting chapters fails, the
    /// stored file and the source record remain, along with any chapter rows
    /// written before the failure; the error is
    /// [`IngestError::ChaptersIncomplete`] carrying the new source id.
    pub fn upload(
        &mut self,
        owner: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<UploadOutcome, IngestError> {
        let kind = SourceKind::from_filename(filename)?;
        let digest = dedup::compute_digest(bytes);
        let size = bytes.len() as u64;

        if let DedupOutcome::Duplicate(existing) =
            dedup::match_existing_by_digest(&mut self.repo, &self.storage, owner, &digest, size)?
        {
            tracing::info!("Upload {} duplicates source {} for {}", filename, existing.id, owner);
            return Ok(UploadOutcome::Duplicate { existing });
        }

        let id = Uuid::new_v4();
        let file_name = format!("{id}.{}", kind.extension());
        let key = StorageKey::from_segments(&[UPLOADS_DIR, owner, &file_name])
            .ok_or_else(|| StorageError::AccessDenied(format!("invalid owner {owner:?}")))?;
        self.storage.write(&key, bytes)?;

        let book = ingest::parse_container(bytes, kind, &self.parse);
        let metadata = book.metadata;

        let cover_path = match (metadata.cover_bytes, metadata.cover_mime_type.as_deref()) {
            (Some(cover), Some(mime_type)) => self.store_cover(id, &cover, mime_type),
            _ => None,
        };

        let title = metadata.title.or_else(|| {
            Path::new(filename)
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

        let source = SourceRecord {
            id,
            owner: owner.to_string(),
            kind,
            title,
            author: metadata.author,
            file_path: key.to_string(),
            file_hash: Some(digest),
            file_size: size,
            cover_path,
        };
        self.repo.insert_source(source.clone())?;
        let chapters = normalize::persist_toc(id, &book.toc, &mut self.repo)
            .map_err(|cause| IngestError::ChaptersIncomplete { source_id: id, cause })?;

        tracing::info!(
            "Created source {} ({}) for {} with {} chapters",
            id,
            kind,
            owner,
            chapters.len()
        );
        Ok(UploadOutcome::Created { source, chapters })
    }

    fn store_cover(&self, id: Uuid, cover: &[u8], mime_type: &str) -> Option<String> {
        let file_name = format!("{id}.{}", mime::extension_for_mime(mime_type));
        let key = StorageKey::from_segments(&[COVERS_DIR, &file_name])?;
        match self.storage.write(&key, cover) {
            Ok(()) => Some(key.to_string()),
            Err(e) => {
                tracing::warn!("Could not store cover for {}: {}", id, e);
                None
            }
        }
    }

    fn load(&self, source_id: Uuid) -> Result<(SourceRecord, Vec<u8>), IngestError> {
        let source = self.repo.get_source(source_id)?;
        let key = StorageKey::new(source.file_path.as_str())?;
        let bytes = self.storage.read(&key)?;
        Ok((source, bytes))
    }

    pub fn read_chapter(&self, source_id: Uuid, href: &str) -> Result<String, IngestError> {
        let (source, bytes) = self.load(source_id)?;
        Ok(extract::extract_chapter(
            &bytes,
            source.kind,
            href,
            source_id,
            &self.extract,
        )?)
    }

    pub fn read_asset(&self, source_id: Uuid, path: &str) -> Result<Asset, IngestError> {
        let (source, bytes) = self.load(source_id)?;
        Ok(extract::read_asset(&bytes, source.kind, path, &self.extract)?)
    }

    /// Record digests for every legacy source of `owner`.
    pub fn backfill(&mut self, owner: &str) -> Result<BackfillReport, IngestError> {
        Ok(dedup::backfill_digests(&mut self.repo, &self.storage, owner, None)?)
    }
}
