#![forbid(unsafe_code)]
//! SQLite adapter for the PageMark engines.
//! Documents of every collection live in a single table; batches commit inside one SQLite
//! transaction, so a failing op rolls the whole batch back.

mod store;
pub use store::SqliteStore;

use pagemark_core::{Engine, EngineConfig, Schema};

/// Engine over an in-memory SQLite database and the restaurant catalog.
pub fn restaurant_engine_in_memory(config: &EngineConfig) -> pagemark_core::Result<Engine<SqliteStore>> {
    Engine::new(SqliteStore::new_in_memory()?, Schema::restaurant(), config)
}
