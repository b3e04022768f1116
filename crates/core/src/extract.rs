//! Chapter text and embedded assets, read back from stored source bytes.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};
use uuid::Uuid;

use crate::archive::{self, Archive};
use crate::detect::SourceKind;
use crate::error::{ArchiveError, ExtractError};
use crate::markdown;
use crate::mime;
use crate::package;
use crate::paths;
use crate::security::{self, SecurityLimits};

pub const DEFAULT_ASSET_ROUTE: &str = "/api/sources/{source_id}/assets";

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Route embedded images are rewritten to. `{source_id}` is substituted
    /// and the archive path is appended as a `path` query parameter.
    pub asset_route: String,
    pub limits: SecurityLimits,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            asset_route: DEFAULT_ASSET_ROUTE.to_string(),
            limits: SecurityLimits::default(),
        }
    }
}

impl ExtractOptions {
    pub fn asset_url(&self, source_id: Uuid, archive_path: &str) -> String {
        format!(
            "{}?path={}",
            self.asset_route.replace("{source_id}", &source_id.to_string()),
            utf8_percent_encode(archive_path, NON_ALPHANUMERIC)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// Text of the chapter at `href`.
///
/// For EPUB this is the inner markup of the chapter's `<body>` with
/// embedded media pointed at the asset route; for Markdown it is the
/// section under the anchor in `href`.
pub fn extract_chapter(
    bytes: &[u8],
    kind: SourceKind,
    href: &str,
    source_id: Uuid,
    options: &ExtractOptions,
) -> Result<String, ExtractError> {
    match kind {
        SourceKind::Epub => extract_epub_chapter(bytes, href, source_id, options),
        SourceKind::Markdown => {
            let text = archive::decode_text(bytes);
            let anchor = paths::split_fragment(href).1.unwrap_or(href);
            markdown::section(&text, anchor).map(str::to_string)
        }
    }
}

fn open_package<'a>(
    bytes: &'a [u8],
    limits: &SecurityLimits,
) -> Result<(Archive<'a>, String), ExtractError> {
    let mut archive = Archive::open_with_limits(bytes, limits.clone())?;
    let package_path = package::locate_package(&mut archive)
        .map_err(|e| ExtractError::Archive(ArchiveError::Corrupt(e.to_string())))?;
    Ok((archive, paths::parent_dir(&package_path).to_string()))
}

fn extract_epub_chapter(
    bytes: &[u8],
    href: &str,
    source_id: Uuid,
    options: &ExtractOptions,
) -> Result<String, ExtractError> {
    let (path, _) = paths::split_fragment(href.trim());
    if path.is_empty() || paths::is_external(path) {
        return Err(ExtractError::EntryNotFound(href.to_string()));
    }

    let (mut archive, base_dir) = open_package(bytes, &options.limits)?;
    let full_path = paths::resolve(&base_dir, path);
    let content = archive.read_href_string(&full_path)?;
    let chapter_dir = paths::parent_dir(&full_path);

    match body_markup(&content, |value| {
        asset_target(chapter_dir, value).map(|target| options.asset_url(source_id, &target))
    }) {
        Ok(markup) => Ok(markup),
        Err(e) => {
            tracing::warn!("Chapter {} is not well-formed XML, returning it unmodified: {}", full_path, e);
            Ok(content)
        }
    }
}

/// Archive path referenced by a media attribute, if it points inside the
/// archive.
fn asset_target(chapter_dir: &str, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('#') || paths::is_external(value) {
        return None;
    }
    let (path, _) = paths::split_fragment(value);
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    if path.is_empty() {
        return None;
    }
    Some(paths::decode(&paths::resolve(chapter_dir, path)).into_owned())
}

/// Attributes that load media, keyed by element local name.
fn media_attributes(element: &[u8]) -> &'static [&'static [u8]] {
    match element {
        b"img" | b"source" | b"audio" | b"input" => &[b"src"],
        b"video" => &[b"src", b"poster"],
        b"image" => &[b"href", b"xlink:href"],
        _ => &[],
    }
}

fn rewrite_media(
    e: &BytesStart<'_>,
    rewrite: &impl Fn(&str) -> Option<String>,
) -> Option<BytesStart<'static>> {
    let names = media_attributes(e.local_name().as_ref());
    if names.is_empty() {
        return None;
    }

    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    let mut changed = false;
    for attr in e.attributes().flatten() {
        if names.contains(&attr.key.as_ref()) {
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            if let Some(url) = rewrite(&value) {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                out.push_attribute((key.as_str(), url.as_str()));
                changed = true;
                continue;
            }
        }
        out.push_attribute(attr);
    }
    changed.then_some(out)
}

/// Inner markup of `<body>`, or the whole document if it has none, with
/// media attributes passed through `rewrite`.
fn body_markup(
    xml: &str,
    rewrite: impl Fn(&str) -> Option<String>,
) -> Result<String, quick_xml::Error> {
    let mut reader = XmlReader::from_str(xml);
    let mut writer = XmlWriter::new(Vec::new());
    let mut depth = 0usize;
    let mut body_depth: Option<usize> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if body_depth.is_none() && e.local_name().as_ref() == b"body" {
                    body_depth = Some(depth);
                    writer = XmlWriter::new(Vec::new());
                    continue;
                }
                match rewrite_media(&e, &rewrite) {
                    Some(rewritten) => writer.write_event(Event::Start(rewritten))?,
                    None => writer.write_event(Event::Start(e))?,
                }
            }
            Event::Empty(e) => {
                if body_depth.is_none() && e.local_name().as_ref() == b"body" {
                    return Ok(String::new());
                }
                match rewrite_media(&e, &rewrite) {
                    Some(rewritten) => writer.write_event(Event::Empty(rewritten))?,
                    None => writer.write_event(Event::Empty(e))?,
                }
            }
            Event::End(e) => {
                if body_depth == Some(depth) {
                    break;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
            }
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
    }

    let out = writer.into_inner();
    Ok(String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Bytes and MIME type of an embedded asset, addressed by archive path.
pub fn read_asset(
    bytes: &[u8],
    kind: SourceKind,
    path: &str,
    options: &ExtractOptions,
) -> Result<Asset, ExtractError> {
    if kind == SourceKind::Markdown {
        return Err(ExtractError::UnsupportedFormat(
            "Markdown sources have no embedded assets".into(),
        ));
    }
    if path.trim().is_empty() {
        return Err(ExtractError::InvalidPath(path.to_string()));
    }
    security::check_path_traversal(path).map_err(|_| ExtractError::InvalidPath(path.to_string()))?;

    let mut archive = Archive::open_with_limits(bytes, options.limits.clone())?;
    let normalized = paths::normalize(path);
    let data = archive.read_href(&normalized)?;
    Ok(Asset {
        bytes: data,
        mime_type: mime::mime_for_path(&normalized),
    })
}
