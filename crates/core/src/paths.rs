//! Archive path arithmetic for EPUB hrefs.
//!
//! Entry names inside a ZIP are plain `/`-separated strings with no leading
//! slash. Hrefs found in package and navigation documents are relative to the
//! document that contains them and may carry a `#fragment`. Directory strings
//! produced here always end with `/`, or are empty for the archive root.

use std::borrow::Cow;

/// Directory component of an archive path, with trailing slash.
///
/// `"OEBPS/content.opf"` -> `"OEBPS/"`, `"content.opf"` -> `""`.
pub fn parent_dir(path: &str) -> &str {
    path.rfind('/').map(|i| &path[..i + 1]).unwrap_or("")
}

/// Split `path#fragment` into its two halves.
pub fn split_fragment(href: &str) -> (&str, Option<&str>) {
    match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    }
}

/// True for hrefs that point outside the archive (`http:`, `data:`, `//host`).
pub fn is_external(href: &str) -> bool {
    if href.starts_with("//") {
        return true;
    }
    match href.find(':') {
        Some(colon) => {
            let scheme = &href[..colon];
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        }
        None => false,
    }
}

/// Join a relative href onto a base directory and collapse `.` / `..`.
///
/// The fragment is not interpreted; callers split it off first. A leading
/// `/` makes the href archive-absolute. `..` segments that would climb above
/// the archive root are dropped.
pub fn resolve(base_dir: &str, href: &str) -> String {
    let joined = if let Some(absolute) = href.strip_prefix('/') {
        absolute.to_string()
    } else {
        format!("{base_dir}{href}")
    };
    normalize(&joined)
}

/// Collapse `.` and `..` segments and duplicate slashes.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Express an archive path relative to `base_dir`.
///
/// Inverse of [`resolve`]: `resolve(base_dir, &relative_to(p, base_dir)) == p`
/// for any normalized `p`.
pub fn relative_to(path: &str, base_dir: &str) -> String {
    if let Some(rest) = path.strip_prefix(base_dir) {
        return rest.to_string();
    }

    let base: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    let target: Vec<&str> = path.split('/').collect();

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::new();
    for _ in common..base.len() {
        parts.push("..");
    }
    parts.extend(&target[common..]);
    parts.join("/")
}

/// Percent-decode an href path (`My%20Book.xhtml` -> `My Book.xhtml`).
pub fn decode(path: &str) -> Cow<'_, str> {
    percent_encoding::percent_decode_str(path).decode_utf8_lossy()
}

/// Reattach a fragment to a path.
pub fn with_fragment(path: &str, fragment: Option<&str>) -> String {
    match fragment {
        Some(fragment) => format!("{path}#{fragment}"),
        None => path.to_string(),
    }
}
