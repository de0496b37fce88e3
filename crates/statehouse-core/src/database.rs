// crates/statehouse-core/src/database.rs
// ============================================================================
// Module: Database Interface
// Description: Backend-agnostic synchronous SQL execution handle.
// Purpose: Define the contract surface the persistence core consumes from
//          the embedded-store collaborator.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The persistence core never opens or manages database files; it consumes a
//! single always-available synchronous [`Database`] handle provided by the
//! store collaborator. The handle exposes exactly the operations the core
//! needs: statement execution without results, parameterized execution
//! returning the affected-row count, single- and multi-row fetches, and
//! begin/commit/rollback of an immediate-mode transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::value::SqlRow;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Database handle errors.
///
/// # Invariants
/// - `Constraint` carries the engine's native message verbatim; it is never
///   wrapped or translated further up the stack.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    /// Engine-level execution error.
    #[error("database error: {0}")]
    Db(String),
    /// Constraint violation with the engine's native message.
    #[error("{0}")]
    Constraint(String),
    /// I/O error opening or touching the store.
    #[error("database io error: {0}")]
    Io(String),
    /// Invalid configuration or store data.
    #[error("invalid database configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Database Handle
// ============================================================================

/// Backend-agnostic synchronous SQL execution handle.
///
/// # Invariants
/// - Implementations serialize statement execution internally; callers may
///   share one handle across the loader and its writer runtime.
/// - `begin_immediate` acquires the write lock at BEGIN time; a nested
///   begin on the same handle fails with the engine's own error.
pub trait Database: Send + Sync {
    /// Executes one or more semicolon-separated statements without results.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when any statement fails.
    fn execute_batch(&self, sql: &str) -> Result<(), DbError>;

    /// Executes a parameterized statement and returns the affected-row
    /// count.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when preparation or execution fails; unique and
    /// primary-key violations surface as [`DbError::Constraint`].
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError>;

    /// Fetches at most one row for a parameterized query.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when preparation or execution fails.
    fn query_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlRow>, DbError>;

    /// Fetches all rows for a parameterized query.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when preparation or execution fails.
    fn query_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DbError>;

    /// Begins an immediate-mode transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when the engine rejects the begin, including a
    /// nested begin on the same handle.
    fn begin_immediate(&self) -> Result<(), DbError>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when no transaction is open or the commit fails.
    fn commit(&self) -> Result<(), DbError>;

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] when no transaction is open or the rollback
    /// fails.
    fn rollback(&self) -> Result<(), DbError>;
}
