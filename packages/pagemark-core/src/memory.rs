use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::document::{cmp_values, Document};
use crate::error::{Error, Result};
use crate::ids::DocId;
use crate::live::{Change, SubscriberHub, Subscription};
use crate::traits::{
    apply_write, check_batch_len, DocumentStore, LiveQuery, Query, WriteBatch,
    DEFAULT_MAX_BATCH_OPS,
};

/// In-memory document store for prototyping and tests.
///
/// Besides the store contract it records the size of every committed batch and can be
/// told to fail an upcoming commit, which is how torn cascades are exercised.
pub struct MemoryStore {
    collections: BTreeMap<String, BTreeMap<DocId, Document>>,
    /// Last revision of deleted documents, dropped again when the id is recreated.
    retired: HashMap<(String, DocId), u64>,
    max_batch_ops: usize,
    hub: SubscriberHub,
    committed: Vec<usize>,
    fail_in: Option<usize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_max_batch_ops(DEFAULT_MAX_BATCH_OPS)
    }
}

impl MemoryStore {
    pub fn with_max_batch_ops(max_batch_ops: usize) -> Self {
        Self {
            collections: BTreeMap::new(),
            retired: HashMap::new(),
            max_batch_ops,
            hub: SubscriberHub::default(),
            committed: Vec::new(),
            fail_in: None,
        }
    }

    /// Make the `n`-th upcoming non-empty commit (1-based) fail without applying anything.
    pub fn fail_nth_commit(&mut self, n: usize) {
        self.fail_in = Some(n.max(1));
    }

    /// Op counts of every committed non-empty batch, oldest first.
    pub fn committed_batches(&self) -> &[usize] {
        &self.committed
    }

    pub fn clear_history(&mut self) {
        self.committed.clear();
    }

    /// Number of documents in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn take_injected_failure(&mut self) -> bool {
        match self.fail_in {
            Some(1) => {
                self.fail_in = None;
                true
            }
            Some(n) => {
                self.fail_in = Some(n - 1);
                false
            }
            None => false,
        }
    }
}

impl DocumentStore for MemoryStore {
    fn query(&self, query: &Query) -> Result<Vec<Document>> {
        let Some(docs) = self.collections.get(&query.collection) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<Document> = docs
            .values()
            .filter(|doc| query.matches(&query.collection, doc))
            .cloned()
            .collect();
        if let Some(field) = &query.order_by {
            // stable sort keeps the id order for ties
            out.sort_by(|a, b| cmp_values(a.get(field), b.get(field)));
        }
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    fn get(&self, collection: &str, id: &DocId) -> Result<Option<Document>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        check_batch_len(&batch, self.max_batch_ops)?;
        if batch.is_empty() {
            return Ok(());
        }
        if self.take_injected_failure() {
            return Err(Error::Storage("injected commit failure".into()));
        }

        // Stage every op first so a failing op leaves the store untouched.
        let mut staged: HashMap<(String, DocId), Option<Document>> = HashMap::new();
        let mut retiring: HashMap<(String, DocId), u64> = HashMap::new();
        let mut changes = Vec::with_capacity(batch.len());
        let len = batch.len();
        for op in batch.into_ops() {
            let key = (op.target.collection.clone(), op.target.id.clone());
            let before = match staged.get(&key) {
                Some(state) => state.clone(),
                None => self.get(&key.0, &key.1)?,
            };
            let retired = retiring
                .get(&key)
                .or_else(|| self.retired.get(&key))
                .copied()
                .unwrap_or(0);
            let after = apply_write(before.as_ref(), retired, &op)?;
            if let (Some(doc), None) = (&before, &after) {
                retiring.insert(key.clone(), doc.revision);
            }
            changes.push(Change {
                collection: key.0.clone(),
                before,
                after: after.clone(),
            });
            staged.insert(key, after);
        }

        for (key, state) in staged {
            let docs = self.collections.entry(key.0.clone()).or_default();
            match state {
                Some(doc) => {
                    docs.insert(key.1.clone(), doc);
                    self.retired.remove(&key);
                }
                None => {
                    docs.remove(&key.1);
                    if let Some(revision) = retiring.get(&key) {
                        self.retired.insert(key, *revision);
                    }
                }
            }
        }
        self.committed.push(len);
        debug!(ops = len, "memory batch committed");
        self.hub.publish(&changes);
        Ok(())
    }

    fn max_batch_ops(&self) -> usize {
        self.max_batch_ops
    }
}

impl LiveQuery for MemoryStore {
    fn subscribe(&mut self, query: Query) -> Result<Subscription> {
        let initial = self.query(&query)?;
        Ok(self.hub.register(query, initial))
    }
}
