//! Dense zero-based `order` over the siblings of a scope.
//!
//! Every structural change (insert, delete) must be followed by [`renumber`]; [`swap`] alone
//! keeps the sequence dense only if nothing else touched the scope in between. Writes derived
//! from a read carry a revision precondition, so a concurrent writer makes the batch fail
//! with `Error::Conflict` instead of leaving duplicate `order` values behind.
//!
//! Precondition: `order` values are unique within a scope. Ties are ordered by id but are
//! otherwise undefined behavior, not something this module repairs.

use tracing::debug;

use crate::document::{field, Document};
use crate::error::Result;
use crate::ids::Scope;
use crate::traits::{DocumentStore, Query, WriteBatch};

/// Query selecting the siblings of `scope` in `order` sequence.
pub fn siblings_query(scope: &Scope) -> Query {
    let query = Query::collection(scope.collection.clone()).order_by(field::ORDER);
    match &scope.parent {
        Some(parent) => query.filter_eq(parent.field.clone(), parent.id.as_str()),
        None => query,
    }
}

pub fn siblings<S: DocumentStore + ?Sized>(store: &S, scope: &Scope) -> Result<Vec<Document>> {
    store.query(&siblings_query(scope))
}

/// `order` value for a new sibling: the current sibling count.
pub fn append<S: DocumentStore + ?Sized>(store: &S, scope: &Scope) -> Result<u64> {
    Ok(siblings(store, scope)?.len() as u64)
}

/// Rewrite `order` to `0..N-1` following the current relative sequence.
///
/// Siblings already holding their target value are left alone, so renumbering a dense scope
/// commits an empty batch. Returns the sibling count.
pub fn renumber<S: DocumentStore + ?Sized>(store: &mut S, scope: &Scope) -> Result<usize> {
    let docs = siblings(store, scope)?;
    let mut batch = WriteBatch::new();
    for (order, doc) in docs.iter().enumerate() {
        let order = order as u64;
        if doc.order() == Some(order) {
            continue;
        }
        batch.update_at(
            &scope.collection,
            &doc.id,
            doc.revision,
            crate::fields! { field::ORDER => order },
        );
    }
    let rewritten = batch.len();
    store.commit(batch)?;
    debug!(%scope, siblings = docs.len(), rewritten, "renumbered scope");
    Ok(docs.len())
}

/// Exchange the `order` values of the siblings at positions `a` and `b`.
///
/// Positions are indexes into the scope's current `order` sequence; screens pass `idx - 1`
/// or `idx + 1`. Returns `false` without writing when either position is out of range or
/// both are equal.
pub fn swap<S: DocumentStore + ?Sized>(
    store: &mut S,
    scope: &Scope,
    a: isize,
    b: isize,
) -> Result<bool> {
    let docs = siblings(store, scope)?;
    let in_range = |i: isize| i >= 0 && (i as usize) < docs.len();
    if a == b || !in_range(a) || !in_range(b) {
        return Ok(false);
    }
    let (a, b) = (a as usize, b as usize);
    let (first, second) = (&docs[a], &docs[b]);
    let first_order = first.order().unwrap_or(a as u64);
    let second_order = second.order().unwrap_or(b as u64);

    let mut batch = WriteBatch::new();
    batch
        .update_at(
            &scope.collection,
            &first.id,
            first.revision,
            crate::fields! { field::ORDER => second_order },
        )
        .update_at(
            &scope.collection,
            &second.id,
            second.revision,
            crate::fields! { field::ORDER => first_order },
        );
    store.commit(batch)?;
    debug!(%scope, a, b, "swapped siblings");
    Ok(true)
}

/// Position of `id` in the scope's `order` sequence.
pub fn position_of<S: DocumentStore + ?Sized>(
    store: &S,
    scope: &Scope,
    id: &crate::ids::DocId,
) -> Result<Option<usize>> {
    Ok(siblings(store, scope)?.iter().position(|doc| &doc.id == id))
}
