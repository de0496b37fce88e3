// crates/statehouse-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Store
// Description: Embedded SQLite implementation of the Database interface.
// Purpose: Own connection lifecycle, pragmas, and immediate transactions for
//          the persistence core.
// Dependencies: statehouse-core, rusqlite, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! [`SqliteStore`] wraps one `rusqlite` connection behind a mutex and
//! implements the core's [`Database`] handle: batch execution,
//! parameterized statements returning affected counts, single- and
//! multi-row fetches, and immediate-mode transaction control issued as
//! literal `BEGIN IMMEDIATE`/`COMMIT`/`ROLLBACK` statements so that a
//! nested begin fails with the engine's own error.
//!
//! Unique and primary-key violations surface as [`DbError::Constraint`]
//! carrying the engine's native message verbatim; the core never wraps or
//! translates them further.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use rusqlite::types::ValueRef;
use serde::Deserialize;
use statehouse_core::Database;
use statehouse_core::DbError;
use statehouse_core::SqlRow;
use statehouse_core::SqlValue;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with defaults for `path`.
    #[must_use]
    pub fn for_path(path: PathBuf) -> Self {
        Self {
            path,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the document does not
    /// deserialize.
    pub fn from_toml_str(text: &str) -> Result<Self, SqliteStoreError> {
        toml::from_str(text).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store lifecycle errors.
///
/// # Invariants
/// - Error messages avoid embedding row payloads.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid store configuration or path.
    #[error("sqlite store invalid configuration: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for DbError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Db(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed implementation of the core [`Database`] handle.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - Transactions are issued as literal statements on the shared
///   connection, so an open transaction spans subsequent handle calls
///   until commit or rollback.
pub struct SqliteStore {
    /// Shared connection guarded by a mutex.
    connection: Mutex<Connection>,
}

impl fmt::Debug for SqliteStore {
    /// Formats the store without reaching into the non-`Debug` connection.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens an `SQLite` store at the configured path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid or the
    /// database cannot be opened.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let connection = open_connection(config)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Opens an in-memory store for hermetic tests.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the in-memory database cannot be
    /// opened.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection =
            Connection::open_in_memory().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    /// Locks the shared connection or reports a poisoned mutex.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.connection.lock().map_err(|_| DbError::Db("sqlite mutex poisoned".to_string()))
    }
}

impl Database for SqliteStore {
    fn execute_batch(&self, sql: &str) -> Result<(), DbError> {
        let guard = self.lock()?;
        guard.execute_batch(sql).map_err(map_sqlite_error)
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, DbError> {
        let guard = self.lock()?;
        let affected = guard
            .execute(sql, params_from_iter(params.iter().map(to_sqlite_value)))
            .map_err(map_sqlite_error)?;
        Ok(u64::try_from(affected).unwrap_or(u64::MAX))
    }

    fn query_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<SqlRow>, DbError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare(sql).map_err(map_sqlite_error)?;
        let columns: Vec<String> =
            statement.column_names().iter().map(ToString::to_string).collect();
        let mut rows = statement
            .query(params_from_iter(params.iter().map(to_sqlite_value)))
            .map_err(map_sqlite_error)?;
        match rows.next().map_err(map_sqlite_error)? {
            Some(row) => Ok(Some(read_row(&columns, row)?)),
            None => Ok(None),
        }
    }

    fn query_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>, DbError> {
        let guard = self.lock()?;
        let mut statement = guard.prepare(sql).map_err(map_sqlite_error)?;
        let columns: Vec<String> =
            statement.column_names().iter().map(ToString::to_string).collect();
        let mut rows = statement
            .query(params_from_iter(params.iter().map(to_sqlite_value)))
            .map_err(map_sqlite_error)?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqlite_error)? {
            fetched.push(read_row(&columns, row)?);
        }
        Ok(fetched)
    }

    fn begin_immediate(&self) -> Result<(), DbError> {
        let guard = self.lock()?;
        guard.execute_batch("BEGIN IMMEDIATE;").map_err(map_sqlite_error)
    }

    fn commit(&self) -> Result<(), DbError> {
        let guard = self.lock()?;
        guard.execute_batch("COMMIT;").map_err(map_sqlite_error)
    }

    fn rollback(&self) -> Result<(), DbError> {
        let guard = self.lock()?;
        guard.execute_batch("ROLLBACK;").map_err(map_sqlite_error)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Maps a `rusqlite` error into the core error taxonomy.
///
/// Constraint violations keep the engine's message verbatim so callers see
/// the native diagnostic unwrapped.
fn map_sqlite_error(error: rusqlite::Error) -> DbError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            DbError::Constraint(error.to_string())
        }
        _ => DbError::Db(error.to_string()),
    }
}

/// Converts a core scalar into a `rusqlite` owned value.
fn to_sqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(number) => Value::Integer(*number),
        SqlValue::Real(number) => Value::Real(*number),
        SqlValue::Text(text) => Value::Text(text.clone()),
    }
}

/// Reads one fetched row into the core row representation.
fn read_row(columns: &[String], row: &rusqlite::Row<'_>) -> Result<SqlRow, DbError> {
    let mut values = Vec::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let value = match row.get_ref(index).map_err(map_sqlite_error)? {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(number) => SqlValue::Integer(number),
            ValueRef::Real(number) => SqlValue::Real(number),
            ValueRef::Text(text) => SqlValue::Text(
                std::str::from_utf8(text)
                    .map_err(|err| DbError::Db(format!("invalid utf-8 in text column: {err}")))?
                    .to_string(),
            ),
            ValueRef::Blob(_) => {
                return Err(DbError::Db(format!("unexpected blob value in column `{column}`")));
            }
        };
        values.push(value);
    }
    Ok(SqlRow::new(columns.to_vec(), values))
}
