pub mod archive;
pub mod config;
pub mod dedup;
pub mod detect;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod library;
pub mod markdown;
pub mod mime;
pub mod nav;
pub mod normalize;
pub mod package;
pub mod paths;
pub mod repository;
pub mod security;
pub mod storage;
pub mod toc;

#[cfg(test)]
mod test_support;

pub mod prelude {
    pub use crate::dedup::{compute_digest, ContentDigest};
    pub use crate::detect::SourceKind;
    pub use crate::error::*;
    pub use crate::extract::{extract_chapter, read_asset, Asset, ExtractOptions};
    pub use crate::ingest::{parse_container, ParseOptions, ParsedBook, ParsedMetadata};
    pub use crate::library::{Library, UploadOutcome};
    pub use crate::normalize::{persist_toc, ChapterRow};
    pub use crate::repository::{ChapterSink, MemoryRepository, SourceRecord, SourceRepository};
    pub use crate::storage::{DirStorage, StorageKey, StorageProvider};
    pub use crate::toc::{flatten, walk, FlatTocEntry, TocItem};
}
