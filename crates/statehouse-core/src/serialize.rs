// crates/statehouse-core/src/serialize.rs
// ============================================================================
// Module: Value Serialization
// Description: Bidirectional mapping between typed field values and
//              storage-native scalars.
// Purpose: Guarantee lossless round-trips for every representable value and
//          reject values the store cannot represent.
// Dependencies: time, thiserror
// ============================================================================

//! ## Overview
//! Pure conversion functions between [`FieldValue`] and [`SqlValue`].
//! Dates are stored as ISO-8601 text with millisecond precision and a UTC
//! "Z" suffix; booleans as integer 0/1; numbers as REAL. NaN and infinite
//! numbers are rejected eagerly because the store has no representation for
//! them and silently storing them would corrupt round-trips.
//!
//! Round-trip law: for every representable value `v` of type `t`,
//! `deserialize(&serialize(&v, t)?, t)?` is observationally equal to `v`
//! (exactly for string/boolean/number, to the millisecond for dates).

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use time::OffsetDateTime;
use time::UtcOffset;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::value::FieldType;
use crate::value::FieldValue;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// ISO-8601 date format with forced millisecond precision and "Z" suffix.
const ISO_MILLIS_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Serialization and deserialization errors.
///
/// # Invariants
/// - Messages name the offending value or kind so callers can self-correct.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerializeError {
    /// NaN passed for a numeric field.
    #[error("value for number field is not a valid number (NaN)")]
    NotANumber,
    /// Positive or negative infinity passed for a numeric field.
    #[error("value for number field is not a finite number")]
    NotFinite,
    /// In-memory value kind does not match the declared field type.
    #[error("value kind `{kind}` does not match declared field type `{expected}`")]
    TypeMismatch {
        /// Kind label of the offending value.
        kind: &'static str,
        /// Name of the declared field type.
        expected: &'static str,
    },
    /// Stored scalar kind cannot hydrate the declared field type.
    #[error("stored `{kind}` scalar cannot deserialize as `{expected}`")]
    UnexpectedStored {
        /// Kind label of the stored scalar.
        kind: &'static str,
        /// Name of the declared field type.
        expected: &'static str,
    },
    /// Stored text could not be parsed as a date.
    #[error("stored text `{text}` is not a valid ISO-8601 date: {message}")]
    InvalidDate {
        /// Offending stored text.
        text: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Stored text could not be parsed as a number.
    #[error("stored text `{text}` is not a valid number")]
    InvalidNumberText {
        /// Offending stored text.
        text: String,
    },
    /// Date value could not be rendered in the storage format.
    #[error("failed to format date value: {0}")]
    DateFormat(String),
}

// ============================================================================
// SECTION: Serialization
// ============================================================================

/// Converts a typed field value into its storage-native scalar.
///
/// # Errors
///
/// Returns [`SerializeError`] for NaN or infinite numbers, for values whose
/// kind does not match `field_type`, and for unformattable dates.
pub fn serialize(value: &FieldValue, field_type: FieldType) -> Result<SqlValue, SerializeError> {
    match (value, field_type) {
        (FieldValue::Null, _) => Ok(SqlValue::Null),
        (FieldValue::String(text), FieldType::String) => Ok(SqlValue::Text(text.clone())),
        (FieldValue::Number(number), FieldType::Number) => {
            if number.is_nan() {
                return Err(SerializeError::NotANumber);
            }
            if number.is_infinite() {
                return Err(SerializeError::NotFinite);
            }
            Ok(SqlValue::Real(*number))
        }
        (FieldValue::Boolean(flag), FieldType::Boolean) => {
            Ok(SqlValue::Integer(i64::from(*flag)))
        }
        (FieldValue::Date(date), FieldType::Date) => {
            let text = date
                .to_offset(UtcOffset::UTC)
                .format(ISO_MILLIS_FORMAT)
                .map_err(|err| SerializeError::DateFormat(err.to_string()))?;
            Ok(SqlValue::Text(text))
        }
        (other, expected) => Err(SerializeError::TypeMismatch {
            kind: other.kind(),
            expected: expected.name(),
        }),
    }
}

/// Converts a storage-native scalar back into a typed field value.
///
/// # Errors
///
/// Returns [`SerializeError`] when the stored scalar kind cannot hydrate the
/// declared field type, including unparsable date or number text.
pub fn deserialize(value: &SqlValue, field_type: FieldType) -> Result<FieldValue, SerializeError> {
    match (value, field_type) {
        (SqlValue::Null, _) => Ok(FieldValue::Null),
        (SqlValue::Text(text), FieldType::String) => Ok(FieldValue::String(text.clone())),
        (SqlValue::Integer(number), FieldType::String) => {
            Ok(FieldValue::String(number.to_string()))
        }
        (SqlValue::Real(number), FieldType::String) => Ok(FieldValue::String(number.to_string())),
        (SqlValue::Real(number), FieldType::Number) => Ok(FieldValue::Number(*number)),
        (SqlValue::Integer(number), FieldType::Number) => {
            #[allow(clippy::cast_precision_loss, reason = "Numeric fields are f64 by contract.")]
            let coerced = *number as f64;
            Ok(FieldValue::Number(coerced))
        }
        (SqlValue::Text(text), FieldType::Number) => match text.trim().parse::<f64>() {
            Ok(number) => Ok(FieldValue::Number(number)),
            Err(_) => Err(SerializeError::InvalidNumberText {
                text: text.clone(),
            }),
        },
        (SqlValue::Integer(number), FieldType::Boolean) => Ok(FieldValue::Boolean(*number == 1)),
        (SqlValue::Real(_) | SqlValue::Text(_), FieldType::Boolean) => {
            Ok(FieldValue::Boolean(false))
        }
        (SqlValue::Text(text), FieldType::Date) => {
            let parsed = OffsetDateTime::parse(text, &Rfc3339).map_err(|err| {
                SerializeError::InvalidDate {
                    text: text.clone(),
                    message: err.to_string(),
                }
            })?;
            Ok(FieldValue::Date(parsed))
        }
        (other, expected) => Err(SerializeError::UnexpectedStored {
            kind: other.kind(),
            expected: expected.name(),
        }),
    }
}

/// Returns the storage column affinity for a field type.
#[must_use]
pub const fn column_affinity(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String | FieldType::Date => "TEXT",
        FieldType::Number => "REAL",
        FieldType::Boolean => "INTEGER",
    }
}
