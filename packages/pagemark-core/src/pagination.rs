//! Page/position assignment for the visible siblings of a scope, and the page-marker
//! collection read-only clients use to learn which pages have content.
//!
//! Recompute positions first, then sync markers with the visible count that recompute
//! returned. Marker count depends only on that count, so the two steps are independent in
//! data and ordered by convention.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::document::{field, Document};
use crate::error::{Error, Result};
use crate::ids::{DocId, Scope};
use crate::ordering::siblings;
use crate::traits::{DocumentStore, Query, SetMode, WriteBatch};

/// `(page, pos)` for the `index`-th visible sibling. A zero `page_size` is rejected.
pub fn page_slot(index: usize, page_size: u64) -> Result<(u64, u64)> {
    check_page_size(page_size)?;
    let index = index as u64;
    Ok((index / page_size, index % page_size))
}

/// Highest page index with content, `None` when nothing is visible.
pub fn last_page(visible_count: usize, page_size: u64) -> Result<Option<u64>> {
    check_page_size(page_size)?;
    Ok(match visible_count {
        0 => None,
        count => Some((count as u64 - 1) / page_size),
    })
}

fn check_page_size(page_size: u64) -> Result<()> {
    if page_size == 0 {
        return Err(Error::InvalidOperation("page size must be positive".into()));
    }
    Ok(())
}

/// Assign `page`/`pos` to every visible sibling by visible rank, in one batch.
///
/// Invisible siblings keep whatever stale values they had; paged consumers never read them.
/// Returns the visible count from this fresh read.
pub fn recompute_visible_positions<S: DocumentStore + ?Sized>(
    store: &mut S,
    scope: &Scope,
    page_size: u64,
) -> Result<usize> {
    check_page_size(page_size)?;
    let docs = siblings(store, scope)?;
    let mut batch = WriteBatch::new();
    let mut visible = 0usize;
    for doc in docs.iter().filter(|doc| doc.is_visible()) {
        let (page, pos) = page_slot(visible, page_size)?;
        visible += 1;
        if doc.page() == Some(page) && doc.pos() == Some(pos) {
            continue;
        }
        batch.update_at(
            &scope.collection,
            &doc.id,
            doc.revision,
            crate::fields! { field::PAGE => page, field::POS => pos },
        );
    }
    let rewritten = batch.len();
    store.commit(batch)?;
    debug!(%scope, visible, rewritten, page_size, "recomputed visible positions");
    Ok(visible)
}

/// Visible sibling count from a fresh read.
pub fn count_visible<S: DocumentStore + ?Sized>(store: &S, scope: &Scope) -> Result<usize> {
    Ok(siblings(store, scope)?
        .iter()
        .filter(|doc| doc.is_visible())
        .count())
}

/// Where the page markers of one scope live.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MarkerScope {
    pub collection: String,
    /// Back-reference field and parent id for scoped families.
    pub parent: Option<(String, DocId)>,
}

impl MarkerScope {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            parent: None,
        }
    }

    pub fn scoped(
        collection: impl Into<String>,
        field: impl Into<String>,
        parent: impl Into<DocId>,
    ) -> Self {
        Self {
            collection: collection.into(),
            parent: Some((field.into(), parent.into())),
        }
    }

    /// `"{index}"` for collection-wide scopes, `"{parent}:{index}"` otherwise.
    pub fn marker_id(&self, index: u64) -> DocId {
        match &self.parent {
            Some((_, parent)) => DocId(format!("{parent}:{index}")),
            None => DocId(index.to_string()),
        }
    }

    pub fn query(&self) -> Query {
        let query = Query::collection(self.collection.clone());
        match &self.parent {
            Some((field, parent)) => query.filter_eq(field.clone(), parent.as_str()),
            None => query,
        }
    }

    fn marker_fields(&self, index: u64) -> crate::document::Fields {
        let mut fields = crate::fields! { field::INDEX => index };
        if let Some((name, parent)) = &self.parent {
            fields.insert(name.clone(), Value::String(parent.0.clone()));
        }
        fields
    }
}

/// Outcome of a marker sync.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MarkerSync {
    pub created: Vec<u64>,
    pub removed: Vec<u64>,
}

fn marker_index(doc: &Document) -> Option<u64> {
    doc.get_u64(field::INDEX).or_else(|| {
        let raw = doc.id.as_str();
        raw.rsplit(':').next().and_then(|tail| tail.parse().ok())
    })
}

/// Existing marker indices for `markers`, sorted and deduplicated.
pub fn marker_indices<S: DocumentStore + ?Sized>(
    store: &S,
    markers: &MarkerScope,
) -> Result<Vec<u64>> {
    let mut indices: Vec<u64> = store
        .query(&markers.query())?
        .iter()
        .filter_map(marker_index)
        .collect();
    indices.sort_unstable();
    indices.dedup();
    Ok(indices)
}

/// Make the marker set for `markers` exactly `{0..=last_page(visible_count)}`.
///
/// `visible_count` may come from an in-memory snapshot or a fresh read; for the same count
/// the resulting marker set is identical. Markers without a readable index are removed.
pub fn sync_page_markers<S: DocumentStore + ?Sized>(
    store: &mut S,
    markers: &MarkerScope,
    visible_count: usize,
    page_size: u64,
) -> Result<MarkerSync> {
    check_page_size(page_size)?;
    let wanted = last_page(visible_count, page_size)?.map_or(0, |last| last + 1);

    let mut existing: BTreeMap<u64, DocId> = BTreeMap::new();
    let mut batch = WriteBatch::new();
    let mut sync = MarkerSync::default();
    for doc in store.query(&markers.query())? {
        match marker_index(&doc) {
            Some(index) if index < wanted && !existing.contains_key(&index) => {
                existing.insert(index, doc.id);
            }
            index => {
                sync.removed.extend(index);
                batch.delete(&markers.collection, &doc.id);
            }
        }
    }

    for index in 0..wanted {
        if existing.contains_key(&index) {
            continue;
        }
        batch.set(
            &markers.collection,
            &markers.marker_id(index),
            markers.marker_fields(index),
            SetMode::Overwrite,
        );
        sync.created.push(index);
    }

    store.commit(batch)?;
    sync.removed.sort_unstable();
    debug!(
        collection = %markers.collection,
        pages = wanted,
        created = sync.created.len(),
        removed = sync.removed.len(),
        "synced page markers"
    );
    Ok(sync)
}
