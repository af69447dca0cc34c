use serde_json::Value;

use crate::document::{Document, Fields};
use crate::error::{Error, Result};
use crate::ids::{DocId, DocRef};
use crate::live::Subscription;

/// Equality filter on one top-level field.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

/// Point-in-time read against a single collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filter: Option<Filter>,
    /// Ascending; missing or null values sort first and ties fall back to the id.
    pub order_by: Option<String>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter = Some(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, collection: &str, doc: &Document) -> bool {
        if collection != self.collection {
            return false;
        }
        match &self.filter {
            Some(filter) => doc.field_matches(&filter.field, &filter.value),
            None => true,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SetMode {
    Overwrite,
    Merge,
}

/// Condition checked against the stored document before an op applies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Precondition {
    /// Compare-and-swap on the document revision.
    Revision(u64),
    Exists,
    Missing,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WriteKind {
    /// Fails with `Conflict` when the id is already taken.
    Create(Fields),
    Set(Fields, SetMode),
    /// Merges into an existing document; fails with `NotFound` otherwise.
    Update(Fields),
    /// Deleting a missing document is not an error.
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WriteOp {
    pub target: DocRef,
    pub kind: WriteKind,
    pub precondition: Option<Precondition>,
}

/// Ordered list of mutations applied all-or-nothing by `DocumentStore::commit`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn create(&mut self, collection: &str, id: &DocId, fields: Fields) -> &mut Self {
        self.push(WriteOp {
            target: DocRef::new(collection, id.clone()),
            kind: WriteKind::Create(fields),
            precondition: None,
        })
    }

    pub fn set(&mut self, collection: &str, id: &DocId, fields: Fields, mode: SetMode) -> &mut Self {
        self.push(WriteOp {
            target: DocRef::new(collection, id.clone()),
            kind: WriteKind::Set(fields, mode),
            precondition: None,
        })
    }

    pub fn update(&mut self, collection: &str, id: &DocId, fields: Fields) -> &mut Self {
        self.push(WriteOp {
            target: DocRef::new(collection, id.clone()),
            kind: WriteKind::Update(fields),
            precondition: None,
        })
    }

    /// Merge update that only applies if the document is still at `revision`.
    pub fn update_at(
        &mut self,
        collection: &str,
        id: &DocId,
        revision: u64,
        fields: Fields,
    ) -> &mut Self {
        self.push(WriteOp {
            target: DocRef::new(collection, id.clone()),
            kind: WriteKind::Update(fields),
            precondition: Some(Precondition::Revision(revision)),
        })
    }

    pub fn delete(&mut self, collection: &str, id: &DocId) -> &mut Self {
        self.push(WriteOp {
            target: DocRef::new(collection, id.clone()),
            kind: WriteKind::Delete,
            precondition: None,
        })
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Default cap on operations per batch, matching common hosted document stores.
pub const DEFAULT_MAX_BATCH_OPS: usize = 500;

/// Document store with bounded, all-or-nothing batched writes.
pub trait DocumentStore {
    fn query(&self, query: &Query) -> Result<Vec<Document>>;
    fn get(&self, collection: &str, id: &DocId) -> Result<Option<Document>>;
    /// Apply every op or none of them. Batches longer than `max_batch_ops` are rejected
    /// with `BatchTooLarge` before any state is touched; an empty batch is a no-op.
    fn commit(&mut self, batch: WriteBatch) -> Result<()>;
    fn max_batch_ops(&self) -> usize;

    fn set(&mut self, collection: &str, id: &DocId, fields: Fields, mode: SetMode) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.set(collection, id, fields, mode);
        self.commit(batch)
    }
}

/// Push-based read model: subscribers receive every committed change matching a query.
pub trait LiveQuery {
    fn subscribe(&mut self, query: Query) -> Result<Subscription>;
}

/// Reject batches longer than `max`.
pub fn check_batch_len(batch: &WriteBatch, max: usize) -> Result<()> {
    if batch.len() > max {
        return Err(Error::BatchTooLarge {
            len: batch.len(),
            max,
        });
    }
    Ok(())
}

/// Compute the state of `op.target` after applying `op` to `current`.
///
/// Shared by every adapter so that create/set/update/delete and precondition semantics stay
/// identical across backends. `None` means the document does not exist afterwards.
///
/// `retired` is the revision the id held when it was last deleted, 0 if it never was.
/// Adapters keep it across deletes so a recreated document continues the old revision
/// sequence and a revision read before the delete can never match again.
pub fn apply_write(
    current: Option<&Document>,
    retired: u64,
    op: &WriteOp,
) -> Result<Option<Document>> {
    match (op.precondition, current) {
        (Some(Precondition::Revision(expected)), Some(doc)) if doc.revision != expected => {
            return Err(Error::Conflict(format!(
                "{} is at revision {}, expected {expected}",
                op.target, doc.revision
            )));
        }
        (Some(Precondition::Revision(_)), None) | (Some(Precondition::Exists), None) => {
            return Err(Error::Conflict(format!("{} no longer exists", op.target)));
        }
        (Some(Precondition::Missing), Some(_)) => {
            return Err(Error::Conflict(format!("{} already exists", op.target)));
        }
        _ => {}
    }

    let next_revision = current.map_or(retired, |doc| doc.revision) + 1;
    let id = op.target.id.clone();
    match &op.kind {
        WriteKind::Create(fields) => {
            if current.is_some() {
                return Err(Error::Conflict(format!("{} already exists", op.target)));
            }
            Ok(Some(Document::new(id, next_revision, fields.clone())))
        }
        WriteKind::Set(fields, SetMode::Overwrite) => {
            Ok(Some(Document::new(id, next_revision, fields.clone())))
        }
        WriteKind::Set(fields, SetMode::Merge) => {
            let mut merged = current.map(|doc| doc.fields.clone()).unwrap_or_default();
            merged.extend(fields.clone());
            Ok(Some(Document::new(id, next_revision, merged)))
        }
        WriteKind::Update(fields) => {
            let Some(doc) = current else {
                return Err(Error::NotFound(op.target.to_string()));
            };
            let mut merged = doc.fields.clone();
            merged.extend(fields.clone());
            Ok(Some(Document::new(id, next_revision, merged)))
        }
        WriteKind::Delete => Ok(None),
    }
}
