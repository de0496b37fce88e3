// crates/statehouse-store-sqlite/src/lib.rs
// ============================================================================
// Module: Statehouse SQLite Store
// Description: Embedded SQLite backend for the statehouse persistence core.
// Purpose: Export the SQLite store, its configuration model, and errors.
// Dependencies: statehouse-core, rusqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! This crate owns everything the persistence core deliberately does not:
//! database file paths, parent directory creation, open flags, pragmas
//! (journal mode, synchronous level, foreign keys), and the busy timeout.
//! The exported [`SqliteStore`] implements the core's `Database` handle and
//! is shared by a `StateLoader` and its debounce writer runtime.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod store;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use store::SqliteJournalMode;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
