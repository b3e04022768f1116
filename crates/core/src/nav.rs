//! Navigation documents: EPUB2 NCX and EPUB3 XHTML nav, with a spine
//! fallback when neither yields anything.

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use scraper::{ElementRef, Html, Selector};

use crate::archive::Archive;
use crate::error::ParseError;
use crate::package::{self, Package};
use crate::paths;
use crate::toc::RawNavTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavSource {
    /// NCX `navMap`.
    Legacy,
    /// XHTML `<nav>` document.
    Modern,
}

impl NavSource {
    /// Parse a navigation document located in `nav_dir`.
    ///
    /// Targets in the returned tree are archive paths (fragment kept);
    /// external and fragment-only targets are left as written.
    pub fn parse(&self, content: &str, nav_dir: &str) -> Result<RawNavTree, ParseError> {
        match self {
            NavSource::Legacy => parse_ncx(content, nav_dir),
            NavSource::Modern => parse_nav_document(content, nav_dir),
        }
    }
}

fn resolve_target(nav_dir: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() || paths::is_external(href) {
        return href.to_string();
    }
    let (path, fragment) = paths::split_fragment(href);
    if path.is_empty() {
        return href.to_string();
    }
    paths::with_fragment(&paths::resolve(nav_dir, path), fragment)
}

fn parse_ncx(content: &str, nav_dir: &str) -> Result<RawNavTree, ParseError> {
    let mut reader = XmlReader::from_str(content);
    let mut buf = Vec::new();
    let mut tree = RawNavTree::new();
    // Indices of the currently open navPoints.
    let mut open: Vec<usize> = Vec::new();
    let mut in_nav_map = false;
    let mut in_label = false;
    let mut in_text = false;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            ParseError::MalformedNavigation(format!("NCX at byte {}: {e}", reader.buffer_position()))
        })?;

        match event {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"navMap" => in_nav_map = true,
                b"navPoint" if in_nav_map => {
                    let index = tree.push("", "", open.last().copied());
                    open.push(index);
                }
                b"navLabel" if !open.is_empty() => in_label = true,
                b"text" if in_label => in_text = true,
                b"content" => set_ncx_target(&mut tree, &open, e, nav_dir),
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"navPoint" if in_nav_map => {
                    tree.push("", "", open.last().copied());
                }
                b"content" => set_ncx_target(&mut tree, &open, e, nav_dir),
                _ => {}
            },
            Event::Text(ref e) if in_text => {
                if let Some(entry) = open.last().and_then(|&i| tree.entry_mut(i)) {
                    match e.unescape() {
                        Ok(text) => entry.label.push_str(&text),
                        Err(_) => entry.label.push_str(&String::from_utf8_lossy(e)),
                    }
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"navMap" => in_nav_map = false,
                b"navPoint" if in_nav_map => {
                    open.pop();
                }
                b"navLabel" => in_label = false,
                b"text" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(tree)
}

fn set_ncx_target(
    tree: &mut RawNavTree,
    open: &[usize],
    e: &quick_xml::events::BytesStart<'_>,
    nav_dir: &str,
) {
    let Some(entry) = open.last().and_then(|&i| tree.entry_mut(i)) else {
        return;
    };
    if entry.href.is_empty() {
        if let Some(src) = package::attribute(e, "src") {
            entry.href = resolve_target(nav_dir, &src);
        }
    }
}

fn parse_nav_document(content: &str, nav_dir: &str) -> Result<RawNavTree, ParseError> {
    let document = Html::parse_document(content);
    let nav_selector = selector("nav")?;
    let list_selector = selector("ol, ul")?;

    let navs: Vec<ElementRef<'_>> = document.select(&nav_selector).collect();
    let nav = navs
        .iter()
        .find(|nav| {
            nav.value()
                .attr("epub:type")
                .is_some_and(|t| t.split_whitespace().any(|t| t == "toc"))
        })
        .or_else(|| navs.iter().find(|nav| nav.value().attr("role") == Some("doc-toc")))
        .or_else(|| navs.first())
        .ok_or_else(|| ParseError::MalformedNavigation("No <nav> element".into()))?;

    let mut tree = RawNavTree::new();
    let Some(root_list) = nav.select(&list_selector).next() else {
        return Ok(tree);
    };

    let mut pending: Vec<(ElementRef<'_>, Option<usize>)> = vec![(root_list, None)];
    while let Some((list, parent)) = pending.pop() {
        for li in child_elements(list).filter(|c| c.value().name() == "li") {
            let heading = child_elements(li).find(|c| matches!(c.value().name(), "a" | "span"));
            let sublist = child_elements(li).find(|c| matches!(c.value().name(), "ol" | "ul"));
            if heading.is_none() && sublist.is_none() {
                continue;
            }

            let (label, href) = match heading {
                Some(el) => (
                    el.text().collect::<String>(),
                    el.value().attr("href").map(|h| resolve_target(nav_dir, h)).unwrap_or_default(),
                ),
                None => (String::new(), String::new()),
            };
            let index = tree.push(label, href, parent);
            if let Some(sublist) = sublist {
                pending.push((sublist, Some(index)));
            }
        }
    }

    Ok(tree)
}

fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.children().filter_map(ElementRef::wrap)
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::MalformedNavigation(format!("Bad selector {css}: {e}")))
}

/// One flat level in spine order, titled by manifest id.
pub fn spine_toc(package: &Package) -> RawNavTree {
    let mut tree = RawNavTree::new();
    for idref in &package.spine {
        let Some(item) = package.item(idref) else {
            tracing::warn!("Spine references unknown manifest id {:?}, skipping", idref);
            continue;
        };
        let label = if item.id.is_empty() {
            format!("Chapter {}", tree.len() + 1)
        } else {
            item.id.clone()
        };
        tree.push(label, item.href.clone(), None);
    }
    tree
}

/// Navigation tree of a package, hrefs relative to the package directory.
///
/// The XHTML nav is tried before the NCX. Unreadable, malformed or empty
/// documents fall through to the next source and finally to the spine.
pub fn package_toc(archive: &mut Archive<'_>, package: &Package) -> RawNavTree {
    let candidates = [
        (NavSource::Modern, package.nav_document()),
        (NavSource::Legacy, package.ncx_document()),
    ];

    for (source, item) in candidates {
        let Some(item) = item else { continue };
        let content = match archive.read_href_string(&item.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Navigation document {} unreadable: {}", item.path, e);
                continue;
            }
        };
        let nav_dir = paths::parent_dir(&item.path);
        let mut tree = match source.parse(&content, nav_dir) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!("Skipping navigation document {}: {}", item.path, e);
                continue;
            }
        };
        if tree.is_empty() {
            tracing::debug!("Navigation document {} has no entries", item.path);
            continue;
        }

        tree.map_hrefs(|href| {
            if paths::is_external(href) || href.starts_with('#') {
                href.to_string()
            } else {
                paths::relative_to(href, &package.base_dir)
            }
        });
        tracing::debug!("{:?} navigation: {} entries from {}", source, tree.len(), item.path);
        return tree;
    }

    tracing::debug!("No usable navigation document, falling back to spine");
    spine_toc(package)
}
