//! Persist a TOC tree as chapter rows.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::repository::ChapterSink;
use crate::toc::TocItem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRow {
    pub id: Uuid,
    pub source_id: Uuid,
    pub title: String,
    pub href: String,
    pub order: u32,
    /// `None` for top-level chapters.
    pub parent_id: Option<Uuid>,
}

/// Insert every item of `toc` in pre-order, parents before children.
///
/// A child is only scheduled after its parent's insert succeeded, so the
/// sink never sees a dangling parent id. The first failing insert aborts the
/// pass; rows inserted before it stay inserted.
pub fn persist_toc(
    source_id: Uuid,
    toc: &[TocItem],
    sink: &mut impl ChapterSink,
) -> Result<Vec<ChapterRow>, RepositoryError> {
    let mut rows = Vec::new();
    let mut stack: Vec<(&TocItem, Option<Uuid>)> = toc.iter().rev().map(|item| (item, None)).collect();

    while let Some((item, parent_id)) = stack.pop() {
        let row = ChapterRow {
            id: Uuid::new_v4(),
            source_id,
            title: item.title.clone(),
            href: item.href.clone(),
            order: item.order,
            parent_id,
        };
        sink.insert_chapter(&row)?;

        stack.extend(item.children.iter().rev().map(|child| (child, Some(row.id))));
        rows.push(row);
    }

    tracing::debug!("Persisted {} chapters for source {}", rows.len(), source_id);
    Ok(rows)
}
