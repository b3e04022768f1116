//! EPUB package document: `META-INF/container.xml` bootstrap, then metadata,
//! manifest and spine from the OPF.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;

use crate::archive::Archive;
use crate::error::ParseError;
use crate::mime;
use crate::paths;

pub const CONTAINER_PATH: &str = "META-INF/container.xml";
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// Href exactly as written, relative to the package document.
    pub href: String,
    /// Archive path of the resource (href resolved against the package dir).
    pub path: String,
    pub media_type: String,
    pub properties: String,
}

impl ManifestItem {
    pub fn has_property(&self, token: &str) -> bool {
        self.properties.split_whitespace().any(|p| p == token)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    /// Archive path of the package document.
    pub path: String,
    /// Directory of the package document; every TOC href is relative to it.
    pub base_dir: String,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Manifest in document order.
    pub manifest: Vec<ManifestItem>,
    /// Spine idrefs in reading order.
    pub spine: Vec<String>,
    /// `toc` attribute of the spine (EPUB2 NCX id).
    pub toc_id: Option<String>,
    cover_meta: Option<String>,
}

impl Package {
    pub fn item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// EPUB3 navigation document.
    pub fn nav_document(&self) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.has_property("nav"))
    }

    /// EPUB2 NCX, by spine `toc` id first and media type second.
    pub fn ncx_document(&self) -> Option<&ManifestItem> {
        self.toc_id
            .as_deref()
            .and_then(|id| self.item(id))
            .or_else(|| self.manifest.iter().find(|item| item.media_type == NCX_MEDIA_TYPE))
    }

    /// Cover image: `cover-image` property, then `<meta name="cover">`
    /// naming a manifest id, then the same meta naming a manifest href.
    pub fn cover_item(&self) -> Option<&ManifestItem> {
        if let Some(item) = self.manifest.iter().find(|item| item.has_property("cover-image")) {
            return Some(item);
        }
        let content = self.cover_meta.as_deref()?;
        self.item(content).or_else(|| {
            let path = paths::resolve(&self.base_dir, content);
            self.manifest
                .iter()
                .find(|item| item.href == content || item.path == path)
        })
    }
}

/// Find the package document through `META-INF/container.xml`.
pub fn locate_package(archive: &mut Archive<'_>) -> Result<String, ParseError> {
    let container = archive
        .read_string(CONTAINER_PATH)
        .map_err(|e| ParseError::MalformedManifest(format!("Cannot read {CONTAINER_PATH}: {e}")))?;

    let mut reader = XmlReader::from_str(&container);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                if let Some(path) = attribute(e, "full-path").filter(|p| !p.is_empty()) {
                    return Ok(paths::normalize(&path));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::MalformedManifest(format!(
                    "Failed to parse {CONTAINER_PATH}: {e}"
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Err(ParseError::MalformedManifest(format!(
        "No rootfile found in {CONTAINER_PATH}"
    )))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Creator,
}

/// Parse the OPF at `package_path`.
pub fn parse_package(content: &str, package_path: &str) -> Result<Package, ParseError> {
    let base_dir = paths::parent_dir(package_path).to_string();
    let mut package = Package {
        path: package_path.to_string(),
        base_dir,
        ..Package::default()
    };

    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();
    let mut in_metadata = false;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            ParseError::MalformedManifest(format!(
                "{package_path} at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let has_body = matches!(event, Event::Start(_));
                match e.local_name().as_ref() {
                    b"metadata" => in_metadata = has_body,
                    b"title" if in_metadata && has_body => {
                        field = Some(Field::Title);
                        text.clear();
                    }
                    b"creator" if in_metadata && has_body => {
                        field = Some(Field::Creator);
                        text.clear();
                    }
                    b"meta" if in_metadata => {
                        if attribute(e, "name").as_deref() == Some("cover") {
                            if let Some(content) = attribute(e, "content") {
                                package.cover_meta.get_or_insert(content);
                            }
                        }
                    }
                    b"item" => {
                        let href = attribute(e, "href").unwrap_or_default();
                        let path = if paths::is_external(&href) {
                            href.clone()
                        } else {
                            paths::resolve(&package.base_dir, paths::split_fragment(&href).0)
                        };
                        package.manifest.push(ManifestItem {
                            id: attribute(e, "id").unwrap_or_default(),
                            path,
                            href,
                            media_type: attribute(e, "media-type").unwrap_or_default(),
                            properties: attribute(e, "properties").unwrap_or_default(),
                        });
                    }
                    b"spine" => {
                        package.toc_id = attribute(e, "toc").filter(|id| !id.is_empty());
                    }
                    b"itemref" => {
                        if let Some(idref) = attribute(e, "idref") {
                            package.spine.push(idref);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref e) if field.is_some() => match e.unescape() {
                Ok(t) => text.push_str(&t),
                Err(_) => text.push_str(&String::from_utf8_lossy(e)),
            },
            Event::CData(ref e) if field.is_some() => {
                text.push_str(&String::from_utf8_lossy(e));
            }
            Event::End(ref e) => {
                let local = e.local_name();
                if local.as_ref() == b"metadata" {
                    in_metadata = false;
                }
                if let Some(current) = field {
                    let closes = match current {
                        Field::Title => local.as_ref() == b"title",
                        Field::Creator => local.as_ref() == b"creator",
                    };
                    if closes {
                        let value = text.split_whitespace().collect::<Vec<_>>().join(" ");
                        if !value.is_empty() {
                            let slot = match current {
                                Field::Title => &mut package.title,
                                Field::Creator => &mut package.author,
                            };
                            slot.get_or_insert(value);
                        }
                        field = None;
                        text.clear();
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    tracing::debug!(
        "Parsed package {}: {} manifest items, {} spine entries",
        package_path,
        package.manifest.len(),
        package.spine.len()
    );
    Ok(package)
}

/// Cover bytes and MIME type, if the package declares a readable cover.
pub fn read_cover(archive: &mut Archive<'_>, package: &Package) -> Option<(Vec<u8>, String)> {
    let item = package.cover_item()?;
    match archive.read_href(&item.path) {
        Ok(bytes) => {
            let mime_type = if item.media_type.is_empty() {
                mime::mime_for_path(&item.path).to_string()
            } else {
                item.media_type.clone()
            };
            Some((bytes, mime_type))
        }
        Err(e) => {
            tracing::warn!("Cover {} declared but unreadable: {}", item.path, e);
            None
        }
    }
}

/// Value of the attribute whose local name is `name`, entity-unescaped.
pub(crate) fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name.as_bytes())
        .map(|attr| match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{epub2_book, epub3_book, ZipBuilder};

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>  Salt   &amp; Stone </dc:title>
    <dc:title>Second</dc:title>
    <dc:creator>First Author</dc:creator>
    <dc:creator>Other Author</dc:creator>
    <meta name="cover" content="Images/c.png"/>
  </metadata>
  <manifest>
    <item id="toc" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="n" href="Nav/nav.xhtml" media-type="application/xhtml+xml" properties="navigation nav"/>
    <item id="c" href="Images/c.png" media-type="image/png"/>
    <item id="t1" href="Text/one.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="t1"/></spine>
</package>"#;

    #[test]
    fn parses_metadata_first_occurrence_wins() {
        let package = parse_package(OPF, "OEBPS/content.opf").unwrap();
        assert_eq!(package.title.as_deref(), Some("Salt & Stone"));
        assert_eq!(package.author.as_deref(), Some("First Author"));
        assert_eq!(package.base_dir, "OEBPS/");
        assert_eq!(package.spine, ["t1"]);
    }

    #[test]
    fn manifest_paths_resolve_against_package_dir() {
        let package = parse_package(OPF, "OEBPS/content.opf").unwrap();
        let item = package.item("t1").unwrap();
        assert_eq!(item.href, "Text/one.xhtml");
        assert_eq!(item.path, "OEBPS/Text/one.xhtml");
    }

    #[test]
    fn locates_navigation_documents() {
        let package = parse_package(OPF, "OEBPS/content.opf").unwrap();
        assert_eq!(package.nav_document().map(|i| i.id.as_str()), Some("n"));
        // No spine toc attribute: found by media type.
        assert_eq!(package.ncx_document().map(|i| i.id.as_str()), Some("toc"));
    }

    #[test]
    fn cover_meta_may_name_an_href() {
        let package = parse_package(OPF, "OEBPS/content.opf").unwrap();
        assert_eq!(package.cover_item().map(|i| i.id.as_str()), Some("c"));
    }

    #[test]
    fn malformed_package_is_an_error() {
        let err = parse_package("<package><metadata></package>", "content.opf").unwrap_err();
        assert!(matches!(err, ParseError::MalformedManifest(_)));
    }

    #[test]
    fn locate_and_read_cover_epub3() {
        let bytes = epub3_book();
        let mut archive = Archive::open(&bytes).unwrap();
        let path = locate_package(&mut archive).unwrap();
        assert_eq!(path, "OEBPS/content.opf");
        let content = archive.read_string(&path).unwrap();
        let package = parse_package(&content, &path).unwrap();
        let (cover, mime_type) = read_cover(&mut archive, &package).unwrap();
        assert_eq!(mime_type, "image/jpeg");
        assert_eq!(&cover[..3], &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn epub2_cover_meta_names_an_id() {
        let bytes = epub2_book();
        let mut archive = Archive::open(&bytes).unwrap();
        let path = locate_package(&mut archive).unwrap();
        assert_eq!(path, "content.opf");
        let content = archive.read_string(&path).unwrap();
        let package = parse_package(&content, &path).unwrap();
        assert_eq!(package.toc_id.as_deref(), Some("ncx"));
        let (_, mime_type) = read_cover(&mut archive, &package).unwrap();
        assert_eq!(mime_type, "image/png");
    }

    #[test]
    fn missing_container_is_malformed() {
        let bytes = ZipBuilder::new().file("mimetype", "application/epub+zip").finish();
        let mut archive = Archive::open(&bytes).unwrap();
        assert!(matches!(
            locate_package(&mut archive),
            Err(ParseError::MalformedManifest(_))
        ));
    }
}
