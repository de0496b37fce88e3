// crates/statehouse-core/src/schema.rs
// ============================================================================
// Module: Schema Manager
// Description: Table/index creation and additive column migration.
// Purpose: Make the physical schema match registered metadata without ever
//          destroying existing data.
// Dependencies: crate::database, crate::meta, crate::serialize
// ============================================================================

//! ## Overview
//! Schema management is additive only. `ensure_*` functions issue
//! `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS` statements;
//! `migrate_*_additive` functions inspect the live table and issue
//! `ALTER TABLE ... ADD COLUMN` for metadata columns that are missing.
//! Columns present in the table but absent from current metadata are left
//! untouched, which keeps rolling deploys forward- and backward-compatible.
//! Every function here is idempotent and safe to call on every loader entry
//! point; repeated calls with the same metadata converge after one call.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;

use crate::database::Database;
use crate::database::DbError;
use crate::meta::CREATED_AT_COLUMN;
use crate::meta::CollectionMeta;
use crate::meta::KEY_COLUMN;
use crate::meta::StateMeta;
use crate::meta::UPDATED_AT_COLUMN;
use crate::serialize::column_affinity;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// SQL expression producing the current UTC time as ISO-8601 text with
/// millisecond precision and a "Z" suffix.
///
/// Timestamp columns are server-set: every write interpolates this trusted
/// expression instead of binding a client-computed value.
pub const NOW_EXPR: &str = "strftime('%Y-%m-%dT%H:%M:%fZ','now')";

// ============================================================================
// SECTION: Table Creation
// ============================================================================

/// Ensures the singleton state table for `meta` exists.
///
/// # Errors
///
/// Returns [`DbError`] when the DDL statement fails.
pub fn ensure_state_table(database: &dyn Database, meta: &StateMeta) -> Result<(), DbError> {
    let mut columns = Vec::with_capacity(meta.fields.len() + 2);
    columns.push(format!("{KEY_COLUMN} TEXT PRIMARY KEY"));
    for field in &meta.fields {
        columns.push(format!("{} {}", field.column, column_affinity(field.field_type)));
    }
    columns.push(format!("{UPDATED_AT_COLUMN} TEXT"));
    database.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        meta.table,
        columns.join(", ")
    ))
}

/// Ensures the collection table for `meta` exists.
///
/// The id column takes the id field's own affinity, so numeric ids get REAL
/// rather than TEXT.
///
/// # Errors
///
/// Returns [`DbError`] when the DDL statement fails.
pub fn ensure_collection_table(
    database: &dyn Database,
    meta: &CollectionMeta,
) -> Result<(), DbError> {
    let mut columns = Vec::with_capacity(meta.fields.len() + 3);
    columns.push(format!(
        "{} {} PRIMARY KEY",
        meta.id.column,
        column_affinity(meta.id.field_type)
    ));
    for field in &meta.fields {
        columns.push(format!("{} {}", field.column, column_affinity(field.field_type)));
    }
    columns.push(format!("{CREATED_AT_COLUMN} TEXT"));
    columns.push(format!("{UPDATED_AT_COLUMN} TEXT"));
    database.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        meta.table,
        columns.join(", ")
    ))
}

/// Ensures every declared index for `meta` exists.
///
/// Index names follow `<table>_idx_<col1>_<col2>_...` in declared column
/// order.
///
/// # Errors
///
/// Returns [`DbError`] when an index statement fails.
pub fn ensure_indices(database: &dyn Database, meta: &CollectionMeta) -> Result<(), DbError> {
    for index in &meta.indices {
        database.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
            index.index_name(&meta.table),
            meta.table,
            index.columns.join(", ")
        ))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Additive Migration
// ============================================================================

/// Adds any metadata columns missing from the live singleton table.
///
/// Never drops or retypes existing columns; table columns absent from
/// current metadata are left untouched.
///
/// # Errors
///
/// Returns [`DbError`] when column inspection or an ALTER statement fails.
pub fn migrate_state_additive(database: &dyn Database, meta: &StateMeta) -> Result<(), DbError> {
    let existing = table_columns(database, &meta.table)?;
    for field in &meta.fields {
        if !existing.contains(&field.column) {
            add_column(database, &meta.table, &field.column, column_affinity(field.field_type))?;
        }
    }
    if !existing.contains(UPDATED_AT_COLUMN) {
        add_column(database, &meta.table, UPDATED_AT_COLUMN, "TEXT")?;
    }
    Ok(())
}

/// Adds any metadata columns missing from the live collection table.
///
/// # Errors
///
/// Returns [`DbError`] when column inspection or an ALTER statement fails.
pub fn migrate_collection_additive(
    database: &dyn Database,
    meta: &CollectionMeta,
) -> Result<(), DbError> {
    let existing = table_columns(database, &meta.table)?;
    for field in &meta.fields {
        if !existing.contains(&field.column) {
            add_column(database, &meta.table, &field.column, column_affinity(field.field_type))?;
        }
    }
    if !existing.contains(CREATED_AT_COLUMN) {
        add_column(database, &meta.table, CREATED_AT_COLUMN, "TEXT")?;
    }
    if !existing.contains(UPDATED_AT_COLUMN) {
        add_column(database, &meta.table, UPDATED_AT_COLUMN, "TEXT")?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the set of column names currently present on `table`.
fn table_columns(database: &dyn Database, table: &str) -> Result<HashSet<String>, DbError> {
    let rows = database.query_all(&format!("PRAGMA table_info({table})"), &[])?;
    let mut columns = HashSet::with_capacity(rows.len());
    for row in rows {
        if let Some(SqlValue::Text(name)) = row.get("name") {
            columns.insert(name.clone());
        }
    }
    Ok(columns)
}

/// Issues one `ALTER TABLE ... ADD COLUMN` statement.
fn add_column(
    database: &dyn Database,
    table: &str,
    column: &str,
    affinity: &str,
) -> Result<(), DbError> {
    database.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {affinity};"))
}
