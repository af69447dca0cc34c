//! Chunked cascades for stores without cross-collection transactions.
//!
//! A cascade is a sequence of bounded batches, not a transaction. When a batch fails after
//! earlier ones committed the error is reported as [`Error::PartialCascade`]; running the
//! same cascade again finishes it, because each chunk query only matches children that
//! still reference the parent. Chunk order follows the store's default order for the
//! reference filter and nothing relies on it.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ids::{DocId, DocRef};
use crate::traits::{DocumentStore, Query, WriteBatch};

/// A collection whose documents point at a parent through `field`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ChildLink {
    pub collection: String,
    pub field: String,
}

impl ChildLink {
    pub fn new(collection: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
        }
    }

    fn chunk_query(&self, parent: &DocId, chunk_size: usize) -> Query {
        Query::collection(self.collection.clone())
            .filter_eq(self.field.clone(), parent.as_str())
            .limit(chunk_size)
    }
}

/// Work done by a cascade so far.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CascadeReport {
    /// Committed batches, including the final parent create/delete.
    pub batches: usize,
    pub deleted: usize,
    pub repointed: usize,
}

impl CascadeReport {
    /// Turn `err` into `PartialCascade` once anything has been committed.
    pub fn fail(&self, parent: &DocRef, err: Error) -> Error {
        if self.batches == 0 || err.is_partial_cascade() {
            return err;
        }
        warn!(%parent, committed_batches = self.batches, error = %err, "cascade partially applied");
        Error::PartialCascade {
            parent: parent.to_string(),
            committed_batches: self.batches,
            source: Box::new(err),
        }
    }
}

/// Chunk size actually used against `store`.
pub fn effective_chunk_size<S: DocumentStore + ?Sized>(store: &S, chunk_size: usize) -> Result<usize> {
    if chunk_size == 0 {
        return Err(Error::InvalidOperation("chunk size must be positive".into()));
    }
    Ok(chunk_size.min(store.max_batch_ops()))
}

/// Delete every document of `link` referencing `parent`, one bounded batch at a time.
///
/// Errors are returned as-is; callers wrap them with [`CascadeReport::fail`].
pub fn delete_referencing<S: DocumentStore + ?Sized>(
    store: &mut S,
    link: &ChildLink,
    parent: &DocId,
    chunk_size: usize,
    report: &mut CascadeReport,
) -> Result<()> {
    let chunk_size = effective_chunk_size(store, chunk_size)?;
    loop {
        let chunk = store.query(&link.chunk_query(parent, chunk_size))?;
        if chunk.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for doc in &chunk {
            batch.delete(&link.collection, &doc.id);
        }
        store.commit(batch)?;
        report.batches += 1;
        report.deleted += chunk.len();
        debug!(
            collection = %link.collection,
            %parent,
            deleted = chunk.len(),
            "deleted child chunk"
        );
    }
}

/// Point every document of `link` referencing `old` at `new`, one bounded batch at a time.
pub fn repoint_referencing<S: DocumentStore + ?Sized>(
    store: &mut S,
    link: &ChildLink,
    old: &DocId,
    new: &DocId,
    chunk_size: usize,
    report: &mut CascadeReport,
) -> Result<()> {
    let chunk_size = effective_chunk_size(store, chunk_size)?;
    loop {
        let chunk = store.query(&link.chunk_query(old, chunk_size))?;
        if chunk.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for doc in &chunk {
            let mut fields = crate::document::Fields::new();
            fields.insert(link.field.clone(), Value::String(new.0.clone()));
            batch.update(&link.collection, &doc.id, fields);
        }
        store.commit(batch)?;
        report.batches += 1;
        report.repointed += chunk.len();
        debug!(
            collection = %link.collection,
            %old,
            %new,
            repointed = chunk.len(),
            "repointed child chunk"
        );
    }
}

/// Delete all children declared in `links`, then `parent` itself.
///
/// Only direct children are handled. For deeper hierarchies the caller runs cascades
/// bottom-up, ending with the root.
pub fn cascade_delete<S: DocumentStore + ?Sized>(
    store: &mut S,
    parent: &DocRef,
    links: &[ChildLink],
    chunk_size: usize,
) -> Result<CascadeReport> {
    let mut report = CascadeReport::default();
    delete_with_children(store, parent, links, chunk_size, &mut report)
        .map_err(|err| report.fail(parent, err))?;
    info!(%parent, batches = report.batches, deleted = report.deleted, "cascade delete finished");
    Ok(report)
}

pub(crate) fn delete_with_children<S: DocumentStore + ?Sized>(
    store: &mut S,
    parent: &DocRef,
    links: &[ChildLink],
    chunk_size: usize,
    report: &mut CascadeReport,
) -> Result<()> {
    effective_chunk_size(store, chunk_size)?;
    for link in links {
        delete_referencing(store, link, &parent.id, chunk_size, report)?;
    }
    let mut batch = WriteBatch::new();
    batch.delete(&parent.collection, &parent.id);
    store.commit(batch)?;
    report.batches += 1;
    report.deleted += 1;
    Ok(())
}

/// Give a parent a new identity: copy it to `new`, repoint every child in `links`, then
/// delete `old`.
///
/// Fails with `NotFound` when `old` does not exist and with `Conflict` when `new` is taken
/// by a different document. A copy left behind by an interrupted rename is picked up again,
/// so the operation can be re-run after a `PartialCascade`: either `old` is still there with
/// the same fields as `new`, or `old` is gone but some child in `links` still references it.
pub fn cascade_repoint_and_rename<S: DocumentStore + ?Sized>(
    store: &mut S,
    collection: &str,
    old: &DocId,
    new: &DocId,
    links: &[ChildLink],
    chunk_size: usize,
) -> Result<CascadeReport> {
    let parent = DocRef::new(collection, old.clone());
    let mut report = CascadeReport::default();
    rename_with_children(store, &parent, new, links, &[], chunk_size, &mut report)
        .map_err(|err| report.fail(&parent, err))?;
    info!(%parent, %new, batches = report.batches, repointed = report.repointed, "rename finished");
    Ok(report)
}

/// True when any document of `links` still points at `parent`.
fn referenced_by<S: DocumentStore + ?Sized>(
    store: &S,
    links: &[ChildLink],
    parent: &DocId,
) -> Result<bool> {
    for link in links {
        if !store.query(&link.chunk_query(parent, 1))?.is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `leftovers` are extra collections the caller cleans up after the repoint (page markers);
/// documents there still naming the old id also mark an interrupted rename.
pub(crate) fn rename_with_children<S: DocumentStore + ?Sized>(
    store: &mut S,
    parent: &DocRef,
    new: &DocId,
    links: &[ChildLink],
    leftovers: &[ChildLink],
    chunk_size: usize,
    report: &mut CascadeReport,
) -> Result<()> {
    if &parent.id == new {
        return Err(Error::InvalidOperation(format!(
            "{parent} cannot be renamed to itself"
        )));
    }
    effective_chunk_size(store, chunk_size)?;
    let original = store.get(&parent.collection, &parent.id)?;
    let target = store.get(&parent.collection, new)?;

    match (&original, &target) {
        (None, None) => return Err(Error::NotFound(parent.to_string())),
        (None, Some(_))
            if !referenced_by(store, links, &parent.id)?
                && !referenced_by(store, leftovers, &parent.id)? =>
        {
            return Err(Error::NotFound(parent.to_string()));
        }
        (Some(original), None) => {
            let mut batch = WriteBatch::new();
            batch.create(&parent.collection, new, original.fields.clone());
            store.commit(batch)?;
            report.batches += 1;
        }
        (Some(original), Some(target)) if original.fields != target.fields => {
            return Err(Error::Conflict(format!(
                "{}/{new} already exists",
                parent.collection
            )));
        }
        _ => debug!(%parent, %new, "resuming interrupted rename"),
    }

    for link in links {
        repoint_referencing(store, link, &parent.id, new, chunk_size, report)?;
    }

    if original.is_some() {
        let mut batch = WriteBatch::new();
        batch.delete(&parent.collection, &parent.id);
        store.commit(batch)?;
        report.batches += 1;
    }
    Ok(())
}
