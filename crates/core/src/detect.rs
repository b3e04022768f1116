//! Source kind detection by file extension.
//!
//! Uploads are gated on their extension before any byte is read: anything
//! that is not an EPUB package or a Markdown file is rejected outright.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

/// Supported upload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Epub,
    Markdown,
}

impl SourceKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            SourceKind::Epub => "application/epub+zip",
            SourceKind::Markdown => "text/markdown",
        }
    }

    /// Canonical extension used when storing an upload.
    pub fn extension(&self) -> &'static str {
        match self {
            SourceKind::Epub => "epub",
            SourceKind::Markdown => "md",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "epub" => Some(SourceKind::Epub),
            "md" | "markdown" => Some(SourceKind::Markdown),
            _ => None,
        }
    }

    /// Determine the kind of an upload or stored file from its name.
    pub fn from_filename(filename: &str) -> Result<Self, ExtractError> {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| {
                ExtractError::UnsupportedFormat(format!(
                    "{filename}: supported formats are epub, md, markdown"
                ))
            })
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension().to_uppercase())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| ExtractError::UnsupportedFormat(s.to_string()))
    }
}
