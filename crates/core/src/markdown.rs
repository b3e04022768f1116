//! Markdown sources: front matter, heading structure and sections.
//!
//! A Markdown file has no navigation document, so its table of contents is
//! inferred from heading levels. TOC hrefs are `#anchor` fragments and the
//! same heading scan is used to cut a section back out at read time, so the
//! two can never disagree about where a heading is.

use std::collections::HashSet;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use crate::error::ExtractError;
use crate::toc::RawNavTree;

/// Title of the single TOC item of a file without headings.
pub const DEFAULT_TITLE: &str = "Document";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Split leading `---` (YAML-style) or `+++` (TOML) front matter off `text`.
///
/// A block that is never closed, or TOML that does not parse, is not front
/// matter: the whole text is returned as the body.
pub fn split_front_matter(text: &str) -> (FrontMatter, &str) {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);

    if let Some((block, body)) = fenced_block(text, "---") {
        return (parse_yaml_front_matter(block), body);
    }
    if let Some((block, body)) = fenced_block(text, "+++") {
        match parse_toml_front_matter(block) {
            Some(fm) => return (fm, body),
            None => tracing::warn!("Unparsable TOML front matter, treating it as body text"),
        }
    }
    (FrontMatter::default(), text)
}

fn fenced_block<'a>(text: &'a str, fence: &str) -> Option<(&'a str, &'a str)> {
    let rest = text.strip_prefix(fence)?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(|c| c == '\r' || c == '\n') == fence {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'')
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn parse_yaml_front_matter(block: &str) -> FrontMatter {
    let mut fm = FrontMatter::default();
    let mut lines = block.lines().peekable();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        let parsed = if value.is_empty() {
            // Block list on the following lines: `- item`.
            let mut items = Vec::new();
            while let Some(item) = lines.peek().copied().and_then(|l| l.trim().strip_prefix("- ")) {
                items.push(unquote(item).to_string());
                lines.next();
            }
            items.join(", ")
        } else if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
            inner
                .split(',')
                .map(unquote)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            unquote(value).to_string()
        };

        match key.as_str() {
            "title" if fm.title.is_none() => fm.title = non_empty(parsed),
            "author" | "authors" if fm.author.is_none() => fm.author = non_empty(parsed),
            _ => {}
        }
    }
    fm
}

fn parse_toml_front_matter(block: &str) -> Option<FrontMatter> {
    let table: toml::Table = toml::from_str(block).ok()?;
    let text_of = |value: &toml::Value| match value {
        toml::Value::String(s) => non_empty(s.clone()),
        toml::Value::Array(items) => non_empty(
            items
                .iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    };

    Some(FrontMatter {
        title: table.get("title").and_then(text_of),
        author: table
            .get("author")
            .or_else(|| table.get("authors"))
            .and_then(text_of),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// 1 to 6.
    pub level: usize,
    pub title: String,
    /// Unique within the document.
    pub anchor: String,
    /// Byte offset of the heading in the body.
    pub start: usize,
}

/// All CommonMark headings of `body`, in document order, with unique anchors.
pub fn scan_headings(body: &str) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut anchors = AnchorSet::default();
    let mut current: Option<(usize, usize, String)> = None;

    for (event, range) in Parser::new_ext(body, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some((level as usize, range.start, String::new()));
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some((_, _, title)) = current.as_mut() {
                    title.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, _, title)) = current.as_mut() {
                    title.push(' ');
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some((level, start, title)) = current.take() {
                    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
                    let anchor = anchors.claim(slugify(&title));
                    headings.push(Heading {
                        level,
                        title,
                        anchor,
                        start,
                    });
                }
            }
            _ => {}
        }
    }
    headings
}

/// Anchor base for a heading title.
///
/// Lowercased, each whitespace run becomes `-`, anything other than
/// alphanumerics, `-` and `_` is dropped.
pub fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut in_space = false;
    for c in title.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                slug.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_alphanumeric() || c == '-' || c == '_' {
            slug.extend(c.to_lowercase());
        }
    }
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

#[derive(Default)]
struct AnchorSet {
    taken: HashSet<String>,
}

impl AnchorSet {
    fn claim(&mut self, base: String) -> String {
        if self.taken.insert(base.clone()) {
            return base;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}-{n}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Nest headings by level: a heading is the child of the nearest preceding
/// heading with a smaller level.
pub fn heading_tree(headings: &[Heading]) -> RawNavTree {
    let mut tree = RawNavTree::new();
    let mut ancestors: Vec<(usize, usize)> = Vec::new();

    for heading in headings {
        while ancestors.last().is_some_and(|&(level, _)| level >= heading.level) {
            ancestors.pop();
        }
        let parent = ancestors.last().map(|&(_, index)| index);
        let index = tree.push(heading.title.as_str(), format!("#{}", heading.anchor), parent);
        ancestors.push((heading.level, index));
    }
    tree
}

/// Front matter and navigation tree of a Markdown document.
pub fn parse_markdown(text: &str) -> (FrontMatter, RawNavTree) {
    let (front_matter, body) = split_front_matter(text);
    let headings = scan_headings(body);

    let tree = if headings.is_empty() {
        let mut tree = RawNavTree::new();
        let title = front_matter.title.as_deref().unwrap_or(DEFAULT_TITLE);
        tree.push(title, "", None);
        tree
    } else {
        heading_tree(&headings)
    };
    tracing::debug!("Markdown document: {} headings", headings.len());
    (front_matter, tree)
}

/// The section under the heading with `anchor`, up to the next heading of
/// the same or a higher rank. An empty anchor selects the whole body.
pub fn section<'a>(text: &'a str, anchor: &str) -> Result<&'a str, ExtractError> {
    let (_, body) = split_front_matter(text);
    let anchor = anchor.trim_start_matches('#');
    if anchor.is_empty() {
        return Ok(body);
    }

    let headings = scan_headings(body);
    let position = headings
        .iter()
        .position(|h| h.anchor == anchor)
        .ok_or_else(|| ExtractError::EntryNotFound(format!("#{anchor}")))?;
    let heading = &headings[position];
    let end = headings[position + 1..]
        .iter()
        .find(|h| h.level <= heading.level)
        .map_or(body.len(), |h| h.start);

    Ok(&body[heading.start..end])
}
