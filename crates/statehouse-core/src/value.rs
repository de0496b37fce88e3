// crates/statehouse-core/src/value.rs
// ============================================================================
// Module: Field and Storage Values
// Description: Typed in-memory field values and storage-native SQL scalars.
// Purpose: Define the value currency shared by serialization, the query
//          builder, and the database interface.
// Dependencies: time
// ============================================================================

//! ## Overview
//! This module defines the two value domains of the persistence core:
//! [`FieldValue`] is the typed in-memory representation of a persisted
//! property, and [`SqlValue`] is the storage-native scalar bound to SQL
//! statements and read back from rows. The [`FieldType`] enumeration is the
//! closed set of persisted property types and governs the mapping between
//! the two domains (see the `serialize` module).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use time::OffsetDateTime;

// ============================================================================
// SECTION: Field Types
// ============================================================================

/// Closed enumeration of persisted property types.
///
/// # Invariants
/// - Governs both the in-memory representation and the storage column
///   affinity: `String`/`Date` map to TEXT, `Number` to REAL, `Boolean` to
///   INTEGER.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// UTF-8 text value.
    String,
    /// Double-precision numeric value.
    Number,
    /// Boolean value stored as integer 0/1.
    Boolean,
    /// Point-in-time value stored as ISO-8601 text.
    Date,
}

impl FieldType {
    /// Returns the stable lowercase name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SECTION: Field Values
// ============================================================================

/// Typed in-memory value of a persisted property.
///
/// # Invariants
/// - `Null` is a first-class value: stored NULL columns hydrate to it on
///   collection reads, and it serializes back to storage NULL.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Absent value.
    Null,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Boolean(bool),
    /// Date value with whole-millisecond round-trip fidelity.
    Date(OffsetDateTime),
}

impl FieldValue {
    /// Returns the stable lowercase kind label used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
        }
    }

    /// Returns true when the value is [`FieldValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::String(value) => f.write_str(value),
            Self::Number(value) => value.fmt(f),
            Self::Boolean(value) => value.fmt(f),
            Self::Date(value) => value.fmt(f),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FieldValue {
    #[allow(clippy::cast_precision_loss, reason = "Numeric fields are f64 by contract.")]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<OffsetDateTime> for FieldValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Date(value)
    }
}

// ============================================================================
// SECTION: Storage Scalars
// ============================================================================

/// Storage-native scalar bound to SQL statements and read back from rows.
///
/// # Invariants
/// - The set mirrors the embedded store's scalar types; blobs are not part
///   of the persistence model and are rejected at the store boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// 64-bit integer scalar.
    Integer(i64),
    /// Double-precision floating-point scalar.
    Real(f64),
    /// UTF-8 text scalar.
    Text(String),
}

impl SqlValue {
    /// Returns the stable lowercase kind label used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
        }
    }

    /// Returns true when the scalar is [`SqlValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Integer(value) => value.fmt(f),
            Self::Real(value) => value.fmt(f),
            Self::Text(value) => f.write_str(value),
        }
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One fetched row: ordered column names with matching scalar values.
///
/// # Invariants
/// - `columns` and `values` always have the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    /// Ordered column names as returned by the statement.
    columns: Vec<String>,
    /// Scalar values positionally matching `columns`.
    values: Vec<SqlValue>,
}

impl SqlRow {
    /// Creates a row from parallel column and value lists.
    ///
    /// Extra values beyond the column list (or vice versa) are truncated so
    /// the length invariant holds.
    #[must_use]
    pub fn new(mut columns: Vec<String>, mut values: Vec<SqlValue>) -> Self {
        let len = columns.len().min(values.len());
        columns.truncate(len);
        values.truncate(len);
        Self {
            columns,
            values,
        }
    }

    /// Returns the value stored under `column`, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.iter().position(|name| name == column).map(|index| &self.values[index])
    }

    /// Returns the ordered column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the ordered scalar values.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}
