//! Parse an uploaded source into metadata and a table of contents.
//!
//! Parsing never fails an upload. Structural problems (corrupt archive,
//! malformed package) are logged and collapse into empty metadata and an
//! empty TOC; the caller still stores the file.

use serde::Serialize;

use crate::archive::{self, Archive};
use crate::detect::SourceKind;
use crate::error::IngestError;
use crate::markdown;
use crate::nav;
use crate::package;
use crate::security::SecurityLimits;
use crate::toc::TocItem;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    #[serde(skip)]
    pub cover_bytes: Option<Vec<u8>>,
    pub cover_mime_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBook {
    pub metadata: ParsedMetadata,
    pub toc: Vec<TocItem>,
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub limits: SecurityLimits,
    /// Read cover image bytes out of EPUB packages.
    pub extract_cover: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            limits: SecurityLimits::default(),
            extract_cover: true,
        }
    }
}

pub fn parse_container(bytes: &[u8], kind: SourceKind, options: &ParseOptions) -> ParsedBook {
    let result = match kind {
        SourceKind::Epub => parse_epub(bytes, options),
        SourceKind::Markdown => Ok(parse_markdown(bytes)),
    };

    match result {
        Ok(book) => book,
        Err(e) => {
            tracing::warn!("Could not parse {} source, storing without structure: {}", kind, e);
            ParsedBook::default()
        }
    }
}

fn parse_epub(bytes: &[u8], options: &ParseOptions) -> Result<ParsedBook, IngestError> {
    let mut archive = Archive::open_with_limits(bytes, options.limits.clone())?;
    let package_path = package::locate_package(&mut archive)?;
    let content = archive.read_string(&package_path)?;
    let package = package::parse_package(&content, &package_path)?;

    let (cover_bytes, cover_mime_type) = if options.extract_cover {
        match package::read_cover(&mut archive, &package) {
            Some((bytes, mime_type)) => (Some(bytes), Some(mime_type)),
            None => (None, None),
        }
    } else {
        (None, None)
    };

    let toc = nav::package_toc(&mut archive, &package).into_toc();

    Ok(ParsedBook {
        metadata: ParsedMetadata {
            title: package.title,
            author: package.author,
            cover_bytes,
            cover_mime_type,
        },
        toc,
    })
}

fn parse_markdown(bytes: &[u8]) -> ParsedBook {
    let text = archive::decode_text(bytes);
    let (front_matter, tree) = markdown::parse_markdown(&text);
    ParsedBook {
        metadata: ParsedMetadata {
            title: front_matter.title,
            author: front_matter.author,
            ..ParsedMetadata::default()
        },
        toc: tree.into_toc(),
    }
}
