use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cascade::{self, CascadeReport, ChildLink};
use crate::config::EngineConfig;
use crate::document::{field, Document, Fields};
use crate::error::{Error, Result};
use crate::ids::{DocId, DocRef, Scope};
use crate::live::Subscription;
use crate::ordering;
use crate::pagination;
use crate::schema::{Family, Schema};
use crate::traits::{DocumentStore, LiveQuery, WriteBatch};

/// Runs the chains an admin screen triggers for one user action: every structural change is
/// followed by renumbering and by repaginating the affected scope, and deletes/renames are
/// propagated to every descendant family declared in the schema.
pub struct Engine<S: DocumentStore> {
    store: S,
    schema: Schema,
    chunk_size: usize,
}

impl<S: DocumentStore> Engine<S> {
    pub fn new(store: S, mut schema: Schema, config: &EngineConfig) -> Result<Self> {
        config.apply(&mut schema)?;
        Ok(Self {
            store,
            schema,
            chunk_size: config.chunk_size,
        })
    }

    /// Engine over the built-in restaurant catalog with default settings.
    pub fn restaurant(store: S) -> Result<Self> {
        Self::new(store, Schema::restaurant(), &EngineConfig::default())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn scope(&self, family: &str, parent: Option<&DocId>) -> Result<Scope> {
        self.schema.family(family)?.scope(parent)
    }

    /// Members of one scope in `order` sequence.
    pub fn siblings(&self, family: &str, parent: Option<&DocId>) -> Result<Vec<Document>> {
        ordering::siblings(&self.store, &self.scope(family, parent)?)
    }

    /// Add a document at the end of its scope.
    ///
    /// The parent must exist. A missing `id` gets a generated one. `visible` defaults to
    /// true unless `fields` sets it.
    pub fn insert(
        &mut self,
        family: &str,
        parent: Option<&DocId>,
        id: Option<DocId>,
        mut fields: Fields,
    ) -> Result<DocId> {
        let family = self.schema.family(family)?.clone();
        let scope = family.scope(parent)?;
        if let (Some(link), Some(parent)) = (&family.parent, parent) {
            let parent_collection = &self.schema.family(&link.family)?.collection;
            if self.store.get(parent_collection, parent)?.is_none() {
                return Err(Error::NotFound(format!("{parent_collection}/{parent}")));
            }
            fields.insert(link.field.clone(), Value::String(parent.0.clone()));
        }

        let id = id.unwrap_or_else(DocId::generate);
        let order = ordering::append(&self.store, &scope)?;
        fields.insert(field::ORDER.into(), order.into());
        fields
            .entry(field::VISIBLE)
            .or_insert(Value::Bool(true));
        fields.insert(field::PAGE.into(), 0.into());
        fields.insert(field::POS.into(), 0.into());

        let mut batch = WriteBatch::new();
        batch.create(&scope.collection, &id, fields);
        self.store.commit(batch)?;
        debug!(%scope, %id, order, "inserted");

        self.repaginate_family(&family, parent)?;
        Ok(id)
    }

    /// Delete a document and, bottom-up, everything that hangs off it; then close the gap in
    /// its scope.
    ///
    /// A failure after some cascade batches were committed is reported as
    /// `Error::PartialCascade`; calling `remove` again finishes the job.
    pub fn remove(&mut self, family: &str, id: &DocId) -> Result<CascadeReport> {
        let family = self.schema.family(family)?.clone();
        let target = DocRef::new(family.collection.clone(), id.clone());
        let doc = self
            .store
            .get(&family.collection, id)?
            .ok_or_else(|| Error::NotFound(target.to_string()))?;
        let parent = self.parent_of(&family, &doc)?;

        let mut report = CascadeReport::default();
        self.remove_subtree(&family, &target, &mut report)
            .map_err(|err| report.fail(&target, err))?;

        let scope = family.scope(parent.as_ref())?;
        ordering::renumber(&mut self.store, &scope)?;
        self.repaginate_family(&family, parent.as_ref())?;
        info!(%target, batches = report.batches, deleted = report.deleted, "removed");
        Ok(report)
    }

    fn remove_subtree(
        &mut self,
        family: &Family,
        target: &DocRef,
        report: &mut CascadeReport,
    ) -> Result<()> {
        self.purge_descendants(family, &target.id, report)?;
        let mut batch = WriteBatch::new();
        batch.delete(&target.collection, &target.id);
        self.store.commit(batch)?;
        report.batches += 1;
        report.deleted += 1;
        Ok(())
    }

    /// Delete every descendant of `id`, deepest families first.
    fn purge_descendants(
        &mut self,
        family: &Family,
        id: &DocId,
        report: &mut CascadeReport,
    ) -> Result<()> {
        let children: Vec<Family> = self.schema.children_of(&family.name).cloned().collect();
        for child in &children {
            if self.schema.children_of(&child.name).next().is_none() {
                continue;
            }
            for doc in ordering::siblings(&self.store, &child.scope(Some(id))?)? {
                self.purge_descendants(child, &doc.id, report)?;
            }
        }
        for link in self.schema.child_links(&family.name) {
            cascade::delete_referencing(&mut self.store, &link, id, self.chunk_size, report)?;
        }
        Ok(())
    }

    pub fn move_up(&mut self, family: &str, id: &DocId) -> Result<bool> {
        self.shift(family, id, -1)
    }

    pub fn move_down(&mut self, family: &str, id: &DocId) -> Result<bool> {
        self.shift(family, id, 1)
    }

    fn shift(&mut self, family: &str, id: &DocId, delta: isize) -> Result<bool> {
        let family = self.schema.family(family)?.clone();
        let doc = self.load(&family, id)?;
        let parent = self.parent_of(&family, &doc)?;
        let scope = family.scope(parent.as_ref())?;
        let idx = ordering::position_of(&self.store, &scope, id)?
            .ok_or_else(|| Error::NotFound(format!("{}/{id}", family.collection)))?
            as isize;

        let moved = ordering::swap(&mut self.store, &scope, idx, idx + delta)
            .map_err(|err| lost_race(&scope, err))?;
        if moved {
            self.repaginate_family(&family, parent.as_ref())?;
        }
        Ok(moved)
    }

    /// Show or hide a document and repage its scope.
    pub fn set_visible(&mut self, family: &str, id: &DocId, visible: bool) -> Result<()> {
        let family = self.schema.family(family)?.clone();
        let doc = self.load(&family, id)?;
        let parent = self.parent_of(&family, &doc)?;
        let scope = family.scope(parent.as_ref())?;

        let mut batch = WriteBatch::new();
        batch.update_at(
            &family.collection,
            id,
            doc.revision,
            crate::fields! { field::VISIBLE => visible },
        );
        self.store
            .commit(batch)
            .map_err(|err| lost_race(&scope, err))?;
        self.repaginate_family(&family, parent.as_ref())
    }

    /// Change a document's id, repointing every child and moving the child page markers to
    /// the new id.
    pub fn rename(&mut self, family: &str, old: &DocId, new: &DocId) -> Result<CascadeReport> {
        let family = self.schema.family(family)?.clone();
        let target = DocRef::new(family.collection.clone(), old.clone());
        let mut report = CascadeReport::default();
        self.rename_subtree(&family, &target, new, &mut report)
            .map_err(|err| report.fail(&target, err))?;
        info!(%target, %new, batches = report.batches, repointed = report.repointed, "renamed");
        Ok(report)
    }

    fn rename_subtree(
        &mut self,
        family: &Family,
        target: &DocRef,
        new: &DocId,
        report: &mut CascadeReport,
    ) -> Result<()> {
        let children: Vec<Family> = self.schema.children_of(&family.name).cloned().collect();
        let child_links: Vec<ChildLink> = children
            .iter()
            .filter_map(|child| {
                let link = child.parent.as_ref()?;
                Some(ChildLink::new(child.collection.clone(), link.field.clone()))
            })
            .collect();
        let marker_links: Vec<ChildLink> = children
            .iter()
            .filter_map(|child| {
                let link = child.parent.as_ref()?;
                let paging = child.pagination.as_ref()?;
                Some(ChildLink::new(paging.markers.clone(), link.field.clone()))
            })
            .collect();
        cascade::rename_with_children(
            &mut self.store,
            target,
            new,
            &child_links,
            &marker_links,
            self.chunk_size,
            report,
        )?;

        // Marker ids embed the parent id, so markers are rebuilt instead of repointed.
        for child in &children {
            let (Some(link), Some(paging)) = (&child.parent, &child.pagination) else {
                continue;
            };
            let markers = ChildLink::new(paging.markers.clone(), link.field.clone());
            cascade::delete_referencing(&mut self.store, &markers, &target.id, self.chunk_size, report)?;
            self.repaginate_family(child, Some(new))?;
        }
        Ok(())
    }

    /// Renumber a scope and repage it. Repairs scopes left non-dense by racing writers.
    pub fn refresh(&mut self, family: &str, parent: Option<&DocId>) -> Result<()> {
        let family = self.schema.family(family)?.clone();
        ordering::renumber(&mut self.store, &family.scope(parent)?)?;
        self.repaginate_family(&family, parent)
    }

    /// Recompute visible positions and sync page markers from that fresh read. No-op for
    /// families without pagination.
    pub fn repaginate(&mut self, family: &str, parent: Option<&DocId>) -> Result<()> {
        let family = self.schema.family(family)?.clone();
        self.repaginate_family(&family, parent)
    }

    fn repaginate_family(&mut self, family: &Family, parent: Option<&DocId>) -> Result<()> {
        let Some(paging) = &family.pagination else {
            return Ok(());
        };
        let scope = family.scope(parent)?;
        let visible =
            pagination::recompute_visible_positions(&mut self.store, &scope, paging.page_size)?;
        if let Some(markers) = family.marker_scope(parent) {
            pagination::sync_page_markers(&mut self.store, &markers, visible, paging.page_size)?;
        }
        Ok(())
    }

    fn load(&self, family: &Family, id: &DocId) -> Result<Document> {
        self.store
            .get(&family.collection, id)?
            .ok_or_else(|| Error::NotFound(format!("{}/{id}", family.collection)))
    }

    fn parent_of(&self, family: &Family, doc: &Document) -> Result<Option<DocId>> {
        match &family.parent {
            Some(link) => doc.reference(&link.field).map(Some).ok_or_else(|| {
                Error::InvalidOperation(format!(
                    "{}/{} has no {} reference",
                    family.collection, doc.id, link.field
                ))
            }),
            None => Ok(None),
        }
    }
}

fn lost_race(scope: &Scope, err: Error) -> Error {
    if err.is_conflict() {
        warn!(%scope, error = %err, "concurrent edit, nothing written");
    }
    err
}

impl<S: DocumentStore + LiveQuery> Engine<S> {
    /// Live view of one scope; the initial snapshot is in `order` sequence.
    pub fn watch(&mut self, family: &str, parent: Option<&DocId>) -> Result<Subscription> {
        let scope = self.scope(family, parent)?;
        self.store.subscribe(ordering::siblings_query(&scope))
    }
}
