#![forbid(unsafe_code)]
//! Ordering, pagination-index and cascade-integrity primitives for an admin console that
//! edits a schemaless document store with bounded batched writes.
//! The crate knows nothing about a concrete backend; adapters implement [`DocumentStore`]
//! (and optionally [`LiveQuery`]) and every engine here runs against that trait.

pub mod cascade;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod ids;
pub mod live;
pub mod memory;
pub mod ordering;
pub mod pagination;
pub mod schema;
pub mod traits;

pub use serde_json;

pub use cascade::{cascade_delete, cascade_repoint_and_rename, CascadeReport, ChildLink};
pub use config::{EngineConfig, CHUNK_SIZE_ENV, DEFAULT_CHUNK_SIZE};
pub use document::{cmp_values, field, Document, Fields};
pub use engine::Engine;
pub use error::{Error, Result};
pub use ids::{DocId, DocRef, ParentRef, Scope};
pub use live::{Change, ChangeEvent, ChangeKind, SubscriberHub, Subscription};
pub use memory::MemoryStore;
pub use pagination::{
    count_visible, last_page, marker_indices, page_slot, recompute_visible_positions,
    sync_page_markers, MarkerScope, MarkerSync,
};
pub use schema::{Family, Pagination, ParentLink, Schema};
pub use traits::{
    apply_write, check_batch_len, DocumentStore, Filter, LiveQuery, Precondition, Query,
    SetMode, WriteBatch, WriteKind, WriteOp, DEFAULT_MAX_BATCH_OPS,
};
