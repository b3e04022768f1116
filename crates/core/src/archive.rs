//! Read-only view over an in-memory ZIP container.

use std::collections::BTreeSet;
use std::io::{Cursor, Read};

use crate::error::ArchiveError;
use crate::paths;
use crate::security::{self, SecurityLimits};

pub struct Archive<'a> {
    zip: zip::ZipArchive<Cursor<&'a [u8]>>,
    limits: SecurityLimits,
}

impl<'a> Archive<'a> {
    /// Open a ZIP container held in `bytes` with default limits.
    pub fn open(bytes: &'a [u8]) -> Result<Self, ArchiveError> {
        Self::open_with_limits(bytes, SecurityLimits::default())
    }

    pub fn open_with_limits(bytes: &'a [u8], limits: SecurityLimits) -> Result<Self, ArchiveError> {
        let zip = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ArchiveError::Corrupt(format!("Invalid ZIP archive: {e}")))?;
        security::check_file_count(zip.len() as u64, &limits)?;
        Ok(Self { zip, limits })
    }

    /// All entry names exactly as recorded in the container.
    pub fn list(&self) -> BTreeSet<String> {
        self.zip.file_names().map(str::to_string).collect()
    }

    /// Raw bytes of the entry named exactly `path`.
    pub fn read(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut file = match self.zip.by_name(path) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(ArchiveError::EntryNotFound(path.to_string()));
            }
            Err(e) => {
                return Err(ArchiveError::Corrupt(format!("Failed to open {path}: {e}")));
            }
        };

        security::check_resource_size(path, file.size(), &self.limits)?;
        security::check_compression_ratio(file.compressed_size(), file.size(), &self.limits)?;

        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| ArchiveError::Corrupt(format!("Failed to read {path}: {e}")))?;
        Ok(buf)
    }

    /// Read an entry as text. Strips a UTF-8 BOM; invalid sequences are
    /// replaced rather than rejected.
    pub fn read_string(&mut self, path: &str) -> Result<String, ArchiveError> {
        let bytes = self.read(path)?;
        Ok(decode_text(&bytes))
    }

    /// Read an entry addressed by an href-derived path.
    ///
    /// Hrefs are URL-encoded while entry names are not, so the path is tried
    /// as written first and then percent-decoded.
    pub fn read_href(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError> {
        match self.read(path) {
            Err(ArchiveError::EntryNotFound(_)) if path.contains('%') => {
                let decoded = paths::decode(path).into_owned();
                self.read(&decoded)
                    .map_err(|e| match e {
                        ArchiveError::EntryNotFound(_) => ArchiveError::EntryNotFound(path.to_string()),
                        other => other,
                    })
            }
            other => other,
        }
    }

    pub fn read_href_string(&mut self, path: &str) -> Result<String, ArchiveError> {
        let bytes = self.read_href(path)?;
        Ok(decode_text(&bytes))
    }
}

pub(crate) fn decode_text(bytes: &[u8]) -> String {
    let content = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match std::str::from_utf8(content) {
        Ok(text) => text.to_string(),
        Err(e) => {
            tracing::warn!("Invalid UTF-8 in entry, decoding lossily: {}", e);
            String::from_utf8_lossy(content).into_owned()
        }
    }
}
