// crates/statehouse-core/src/error.rs
// ============================================================================
// Module: Loader Error Surface
// Description: Umbrella error for the StateLoader façade.
// Purpose: Combine component errors with the loader's misuse guards into one
//          caller-facing taxonomy.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Component errors ([`RegistrationError`], [`SerializeError`],
//! [`QueryError`], [`DbError`]) convert into [`StateError`] unchanged; the
//! misuse variants are raised by the loader itself when callers hold the API
//! wrong. Nothing is caught-and-swallowed on this surface: every failure
//! propagates to the immediate caller unmodified, and a failed transaction
//! body's error is returned exactly as the body produced it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::database::DbError;
use crate::meta::RegistrationError;
use crate::query::QueryError;
use crate::serialize::SerializeError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Caller-facing error surface of the loader.
///
/// # Invariants
/// - Misuse messages name the offending type (and id where relevant) so the
///   integrating engineer can self-correct.
/// - `Db(DbError::Constraint(_))` carries the engine's native message
///   verbatim.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    /// Registration-time invariant violation.
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    /// Value serialization failure.
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    /// Predicate or order-by construction failure.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Database handle failure, including verbatim constraint violations.
    #[error(transparent)]
    Db(#[from] DbError),
    /// Operation on a type with no registration under either pattern.
    #[error("type `{type_name}` is not registered as a persisted state type")]
    NotRegistered {
        /// Offending type name.
        type_name: &'static str,
    },
    /// Collection operation on a type without collection registration.
    #[error("type `{type_name}` is not registered as a persisted collection")]
    NotCollection {
        /// Offending type name.
        type_name: &'static str,
    },
    /// Singleton operation on a type registered as a persisted collection.
    #[error(
        "type `{type_name}` is a persisted collection; use get() or find() instead of load()"
    )]
    IsCollection {
        /// Offending type name.
        type_name: &'static str,
    },
    /// Point lookup required a row that does not exist.
    #[error("no `{type_name}` row found with id `{id}`")]
    NotFound {
        /// Entity type name.
        type_name: &'static str,
        /// Rendered id value.
        id: String,
    },
    /// Bulk update attempted with an empty predicate.
    #[error("update_where requires at least one WHERE condition")]
    EmptyUpdateFilter,
    /// Collection insert or upsert carried a NULL id value.
    #[error("id value for `{type_name}` must not be null")]
    NullId {
        /// Offending type name.
        type_name: &'static str,
    },
}
