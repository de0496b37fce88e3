// crates/statehouse-core/src/lib.rs
// ============================================================================
// Module: Statehouse Core
// Description: Keyed-state persistence core over an embedded SQL store.
// Purpose: Export the metadata registry, serialization, schema manager,
//          query builder, and the StateLoader façade.
// Dependencies: convert_case, serde, thiserror, time
// ============================================================================

//! ## Overview
//! Statehouse persists typed application state into an embedded SQL store
//! under two patterns: singleton keyed state with debounced auto-save, and
//! multi-row collections with explicit `save()`/`delete()`, a structured
//! query builder, bulk mutation, and immediate-mode transactions.
//!
//! The core is backend-agnostic: it consumes a synchronous [`Database`]
//! handle (implemented by the `statehouse-store-sqlite` crate) and exposes
//! typed objects and query results back. Schema management is strictly
//! additive; repeated registration/migration calls converge without ever
//! dropping a row or a column.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod database;
pub mod debounce;
pub mod error;
pub mod loader;
pub mod meta;
pub mod query;
pub mod schema;
pub mod serialize;
pub mod value;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use database::Database;
pub use database::DbError;
pub use debounce::DebounceStatsSnapshot;
pub use error::StateError;
pub use loader::Bound;
pub use loader::FindOptions;
pub use loader::Persistable;
pub use loader::StateHandle;
pub use loader::StateLoader;
pub use loader::StateLoaderConfig;
pub use loader::Updates;
pub use meta::ClassToken;
pub use meta::CollectionMeta;
pub use meta::CollectionRegistration;
pub use meta::FieldMeta;
pub use meta::IndexMeta;
pub use meta::RegistrationError;
pub use meta::StateMeta;
pub use meta::StateRegistration;
pub use meta::StateRegistry;
pub use query::Condition;
pub use query::Filter;
pub use query::OrderTerm;
pub use query::Predicate;
pub use query::QueryError;
pub use serialize::SerializeError;
pub use value::FieldType;
pub use value::FieldValue;
pub use value::SqlRow;
pub use value::SqlValue;
