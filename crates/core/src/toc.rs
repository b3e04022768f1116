//! Table-of-contents trees.
//!
//! Every navigation source (NCX, XHTML nav, spine fallback, Markdown
//! headings) is lowered into a [`RawNavTree`]: a flat list in document order
//! where each entry points at an earlier entry as its parent. Depth comes
//! from untrusted input, so nothing in this module recurses; the nested
//! [`TocItem`] tree is assembled bottom-up from the flat list.

use serde::Serialize;

/// Transient parser output; becomes a chapter row once persisted.
///
/// Not `Serialize`: serde would recurse once per nesting level. Use
/// [`flatten`] for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocItem {
    pub title: String,
    pub href: String,
    /// Position among siblings, starting at 0 in every sibling group.
    pub order: u32,
    pub children: Vec<TocItem>,
}

impl TocItem {
    pub fn leaf(title: impl Into<String>, href: impl Into<String>, order: u32) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            order,
            children: Vec::new(),
        }
    }
}

impl Drop for TocItem {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut item) = pending.pop() {
            pending.append(&mut item.children);
        }
    }
}

/// Pre-order iterator over every item of a forest.
pub fn walk(items: &[TocItem]) -> TocIter<'_> {
    TocIter {
        stack: items.iter().rev().collect(),
    }
}

pub struct TocIter<'a> {
    stack: Vec<&'a TocItem>,
}

impl<'a> Iterator for TocIter<'a> {
    type Item = &'a TocItem;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.stack.pop()?;
        self.stack.extend(item.children.iter().rev());
        Some(item)
    }
}

/// One item of a TOC in flat pre-order form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatTocEntry {
    pub title: String,
    pub href: String,
    pub order: u32,
    /// 0 for top-level items.
    pub depth: usize,
    /// Index of the parent in the flattened list.
    pub parent: Option<usize>,
}

/// Flatten a forest in pre-order, recording depth and parent index.
pub fn flatten(items: &[TocItem]) -> Vec<FlatTocEntry> {
    let mut out = Vec::new();
    let mut stack: Vec<(&TocItem, usize, Option<usize>)> =
        items.iter().rev().map(|item| (item, 0, None)).collect();
    while let Some((item, depth, parent)) = stack.pop() {
        let index = out.len();
        out.push(FlatTocEntry {
            title: item.title.clone(),
            href: item.href.clone(),
            order: item.order,
            depth,
            parent,
        });
        stack.extend(item.children.iter().rev().map(|child| (child, depth + 1, Some(index))));
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNavEntry {
    pub label: String,
    pub href: String,
    /// Index of the parent entry. Always smaller than this entry's index.
    pub parent: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawNavTree {
    entries: Vec<RawNavEntry>,
}

pub const UNTITLED: &str = "Untitled";

impl RawNavTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its index.
    ///
    /// Panics if `parent` does not refer to an entry that already exists.
    pub fn push(&mut self, label: impl Into<String>, href: impl Into<String>, parent: Option<usize>) -> usize {
        let index = self.entries.len();
        if let Some(parent) = parent {
            assert!(parent < index, "parent {parent} must precede entry {index}");
        }
        self.entries.push(RawNavEntry {
            label: label.into(),
            href: href.into(),
            parent,
        });
        index
    }

    pub fn entries(&self) -> &[RawNavEntry] {
        &self.entries
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut RawNavEntry> {
        self.entries.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite every non-empty href in place.
    pub fn map_hrefs(&mut self, mut f: impl FnMut(&str) -> String) {
        for entry in &mut self.entries {
            if !entry.href.is_empty() {
                entry.href = f(&entry.href);
            }
        }
    }

    /// Assemble the nested tree.
    ///
    /// Sibling order is insertion order and `order` restarts at 0 in each
    /// group. Blank labels become [`UNTITLED`]; an entry without a target
    /// takes the target of its first descendant that has one.
    pub fn into_toc(self) -> Vec<TocItem> {
        let count = self.entries.len();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut roots = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            match entry.parent {
                Some(parent) => children[parent].push(index),
                None => roots.push(index),
            }
        }

        // Children always have larger indices than their parent, so a
        // reverse sweep sees every child before its parent.
        let mut built: Vec<Option<TocItem>> = Vec::with_capacity(count);
        built.resize_with(count, || None);
        let mut entries: Vec<Option<RawNavEntry>> = self.entries.into_iter().map(Some).collect();

        for index in (0..count).rev() {
            let Some(entry) = entries[index].take() else {
                continue;
            };
            let kids: Vec<TocItem> = children[index]
                .iter()
                .enumerate()
                .filter_map(|(order, &child)| {
                    built[child].take().map(|mut item| {
                        item.order = order as u32;
                        item
                    })
                })
                .collect();

            let mut href = entry.href;
            if href.is_empty() {
                if let Some(inherited) = kids.iter().map(|k| &k.href).find(|h| !h.is_empty()) {
                    href = inherited.clone();
                }
            }

            let title = entry.label.split_whitespace().collect::<Vec<_>>().join(" ");
            built[index] = Some(TocItem {
                title: if title.is_empty() { UNTITLED.to_string() } else { title },
                href,
                order: 0,
                children: kids,
            });
        }

        roots
            .into_iter()
            .enumerate()
            .filter_map(|(order, index)| {
                built[index].take().map(|mut item| {
                    item.order = order as u32;
                    item
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_nested_tree_with_per_group_order() {
        let mut tree = RawNavTree::new();
        let a = tree.push("A", "a.xhtml", None);
        tree.push("A.1", "a.xhtml#1", Some(a));
        let a2 = tree.push("A.2", "a.xhtml#2", Some(a));
        tree.push("A.2.i", "a.xhtml#2i", Some(a2));
        tree.push("B", "b.xhtml", None);

        let toc = tree.into_toc();
        assert_eq!(
            toc,
            vec![
                TocItem {
                    title: "A".into(),
                    href: "a.xhtml".into(),
                    order: 0,
                    children: vec![
                        TocItem::leaf("A.1", "a.xhtml#1", 0),
                        TocItem {
                            title: "A.2".into(),
                            href: "a.xhtml#2".into(),
                            order: 1,
                            children: vec![TocItem::leaf("A.2.i", "a.xhtml#2i", 0)],
                        },
                    ],
                },
                TocItem::leaf("B", "b.xhtml", 1),
            ]
        );
    }

    #[test]
    fn blank_labels_and_missing_targets() {
        let mut tree = RawNavTree::new();
        let group = tree.push("  Part\n  One ", "", None);
        let inner = tree.push("", "", Some(group));
        tree.push("Leaf", "p1.xhtml", Some(inner));

        let toc = tree.into_toc();
        assert_eq!(toc[0].title, "Part One");
        assert_eq!(toc[0].href, "p1.xhtml");
        assert_eq!(toc[0].children[0].title, UNTITLED);
        assert_eq!(toc[0].children[0].href, "p1.xhtml");
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let depth = 50_000;
        let mut tree = RawNavTree::new();
        let mut parent = None;
        for i in 0..depth {
            parent = Some(tree.push(format!("L{i}"), format!("x.xhtml#{i}"), parent));
        }
        let toc = tree.into_toc();
        assert_eq!(toc.len(), 1);
        assert_eq!(walk(&toc).count(), depth);

        let flat = flatten(&toc);
        assert_eq!(flat.len(), depth);
        assert_eq!(flat[depth - 1].depth, depth - 1);
        assert_eq!(flat[depth - 1].parent, Some(depth - 2));
        drop(toc);
    }

    #[test]
    fn flatten_records_depth_and_parent() {
        let mut tree = RawNavTree::new();
        let a = tree.push("A", "a", None);
        let a1 = tree.push("A1", "a1", Some(a));
        tree.push("A1x", "a1x", Some(a1));
        tree.push("A2", "a2", Some(a));
        tree.push("B", "b", None);
        let flat = flatten(&tree.into_toc());

        let shape: Vec<_> = flat
            .iter()
            .map(|e| (e.title.as_str(), e.order, e.depth, e.parent))
            .collect();
        assert_eq!(
            shape,
            [
                ("A", 0, 0, None),
                ("A1", 0, 1, Some(0)),
                ("A1x", 0, 2, Some(1)),
                ("A2", 1, 1, Some(0)),
                ("B", 1, 0, None),
            ]
        );
    }

    #[test]
    fn walk_is_pre_order() {
        let mut tree = RawNavTree::new();
        let a = tree.push("A", "a", None);
        tree.push("A1", "a1", Some(a));
        tree.push("B", "b", None);
        let toc = tree.into_toc();
        let titles: Vec<_> = walk(&toc).map(|i| i.title.as_str()).collect();
        assert_eq!(titles, ["A", "A1", "B"]);
    }

    #[test]
    fn map_hrefs_skips_empty() {
        let mut tree = RawNavTree::new();
        tree.push("A", "x.xhtml", None);
        tree.push("B", "", None);
        tree.map_hrefs(|h| format!("OEBPS/{h}"));
        assert_eq!(tree.entries()[0].href, "OEBPS/x.xhtml");
        assert_eq!(tree.entries()[1].href, "");
    }
}
