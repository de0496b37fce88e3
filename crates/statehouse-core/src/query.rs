// crates/statehouse-core/src/query.rs
// ============================================================================
// Module: Query Builder
// Description: Structured filter/order specifications compiled to
//              parameterized SQL.
// Purpose: Translate caller filters into predicate text plus bound values
//          without ever interpolating caller-controlled data into SQL.
// Dependencies: crate::meta, crate::serialize, thiserror
// ============================================================================

//! ## Overview
//! Filters are ordered lists of `(property, condition)` clauses over a
//! closed operator set. [`build_predicate`] resolves properties to columns
//! through collection metadata and emits `?`-parameterized SQL joined with
//! AND in declaration order; every caller value travels as a bound
//! parameter. Only trusted operator and column tokens reach the SQL text.
//!
//! Edge cases fixed by contract:
//! - an empty (or fully skipped) filter compiles to an empty predicate and
//!   an empty bind list, and callers emit no WHERE clause;
//! - `In` over an empty list compiles to an unconditionally false
//!   predicate, `NotIn` over an empty list to an unconditionally true one;
//! - string-match operators escape `\`, `%`, and `_` found in the caller's
//!   value before wrapping in wildcards, with an explicit ESCAPE character.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::meta::CollectionMeta;
use crate::serialize::SerializeError;
use crate::serialize::serialize;
use crate::value::FieldType;
use crate::value::FieldValue;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Escape character declared on every LIKE predicate.
const LIKE_ESCAPE: char = '\\';

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Predicate and order-by construction errors.
///
/// # Invariants
/// - Unknown-property messages list every known property so callers can
///   self-correct.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Filter or order term referenced an unknown property.
    #[error("unknown property `{property}`; known properties: {known}")]
    UnknownProperty {
        /// Offending property name.
        property: String,
        /// Comma-separated known property names.
        known: String,
    },
    /// Order term carried an unrecognized direction string.
    #[error("invalid order direction `{direction}`; expected asc or desc")]
    InvalidDirection {
        /// Offending direction string.
        direction: String,
    },
    /// Filter value failed serialization for the resolved field type.
    #[error("invalid filter value for `{property}`: {source}")]
    Value {
        /// Property whose value failed to serialize.
        property: String,
        /// Underlying serialization error.
        #[source]
        source: SerializeError,
    },
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Closed set of filter operators.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equals.
    Eq(FieldValue),
    /// Not equals.
    Neq(FieldValue),
    /// Less than.
    Lt(FieldValue),
    /// Less than or equal.
    Lte(FieldValue),
    /// Greater than.
    Gt(FieldValue),
    /// Greater than or equal.
    Gte(FieldValue),
    /// Member of the listed values; empty list matches nothing.
    In(Vec<FieldValue>),
    /// Not a member of the listed values; empty list matches everything.
    NotIn(Vec<FieldValue>),
    /// Stored value is NULL.
    IsNull,
    /// Stored value is not NULL.
    IsNotNull,
    /// Text contains the literal substring (wildcards in the value are
    /// escaped).
    Contains(String),
    /// Text starts with the literal prefix.
    StartsWith(String),
    /// Text ends with the literal suffix.
    EndsWith(String),
}

/// Ordered filter specification: `(property, condition)` clauses combined
/// with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Clauses in declaration order.
    clauses: Vec<(String, Condition)>,
}

impl Filter {
    /// Creates an empty filter (matches every row).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality clause; sugar for [`Condition::Eq`].
    #[must_use]
    pub fn value(self, property: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.condition(property, Condition::Eq(value.into()))
    }

    /// Adds an explicit condition clause.
    #[must_use]
    pub fn condition(mut self, property: impl Into<String>, condition: Condition) -> Self {
        self.clauses.push((property.into(), condition));
        self
    }

    /// Adds a condition clause only when `condition` is present.
    ///
    /// Absent conditions are skipped entirely: the property is omitted from
    /// the predicate rather than translated to an IS NULL check.
    #[must_use]
    pub fn maybe(self, property: impl Into<String>, condition: Option<Condition>) -> Self {
        match condition {
            Some(condition) => self.condition(property, condition),
            None => self,
        }
    }

    /// Returns true when no clauses were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns the clauses in declaration order.
    #[must_use]
    pub fn clauses(&self) -> &[(String, Condition)] {
        &self.clauses
    }
}

// ============================================================================
// SECTION: Predicate Construction
// ============================================================================

/// Compiled predicate: SQL text plus positional bind values.
///
/// # Invariants
/// - `sql` contains only trusted column/operator tokens and `?` markers.
/// - An empty `sql` means "no WHERE clause", never "match nothing".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    /// Predicate SQL without the WHERE keyword; empty for empty filters.
    pub sql: String,
    /// Positional bind values matching the `?` markers.
    pub params: Vec<SqlValue>,
}

/// Compiles a filter into a parameterized predicate for `meta`.
///
/// # Errors
///
/// Returns [`QueryError`] for unknown properties or unserializable filter
/// values.
pub fn build_predicate(meta: &CollectionMeta, filter: &Filter) -> Result<Predicate, QueryError> {
    let mut fragments = Vec::with_capacity(filter.clauses().len());
    let mut params = Vec::new();
    for (property, condition) in filter.clauses() {
        let (column, field_type) = resolve_property(meta, property)?;
        match condition {
            Condition::Eq(value) => {
                fragments.push(format!("{column} = ?"));
                params.push(bind_value(property, value, field_type)?);
            }
            Condition::Neq(value) => {
                fragments.push(format!("{column} != ?"));
                params.push(bind_value(property, value, field_type)?);
            }
            Condition::Lt(value) => {
                fragments.push(format!("{column} < ?"));
                params.push(bind_value(property, value, field_type)?);
            }
            Condition::Lte(value) => {
                fragments.push(format!("{column} <= ?"));
                params.push(bind_value(property, value, field_type)?);
            }
            Condition::Gt(value) => {
                fragments.push(format!("{column} > ?"));
                params.push(bind_value(property, value, field_type)?);
            }
            Condition::Gte(value) => {
                fragments.push(format!("{column} >= ?"));
                params.push(bind_value(property, value, field_type)?);
            }
            Condition::In(values) => {
                if values.is_empty() {
                    fragments.push("0 = 1".to_string());
                } else {
                    fragments.push(format!("{column} IN ({})", markers(values.len())));
                    for value in values {
                        params.push(bind_value(property, value, field_type)?);
                    }
                }
            }
            Condition::NotIn(values) => {
                if values.is_empty() {
                    fragments.push("1 = 1".to_string());
                } else {
                    fragments.push(format!("{column} NOT IN ({})", markers(values.len())));
                    for value in values {
                        params.push(bind_value(property, value, field_type)?);
                    }
                }
            }
            Condition::IsNull => fragments.push(format!("{column} IS NULL")),
            Condition::IsNotNull => fragments.push(format!("{column} IS NOT NULL")),
            Condition::Contains(text) => {
                fragments.push(like_fragment(column));
                params.push(SqlValue::Text(format!("%{}%", escape_like(text))));
            }
            Condition::StartsWith(text) => {
                fragments.push(like_fragment(column));
                params.push(SqlValue::Text(format!("{}%", escape_like(text))));
            }
            Condition::EndsWith(text) => {
                fragments.push(like_fragment(column));
                params.push(SqlValue::Text(format!("%{}", escape_like(text))));
            }
        }
    }
    Ok(Predicate {
        sql: fragments.join(" AND "),
        params,
    })
}

// ============================================================================
// SECTION: Order Construction
// ============================================================================

/// One order-by term: property plus direction string.
///
/// # Invariants
/// - Direction is validated (case-insensitively) at build time, not at
///   construction, so the invalid-direction error surfaces alongside
///   unknown-property errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    /// Property to order by.
    property: String,
    /// Raw direction string; normalized at build time.
    direction: String,
}

impl OrderTerm {
    /// Creates a term with an explicit direction string.
    #[must_use]
    pub fn new(property: impl Into<String>, direction: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: direction.into(),
        }
    }

    /// Creates an ascending term.
    #[must_use]
    pub fn asc(property: impl Into<String>) -> Self {
        Self::new(property, "asc")
    }

    /// Creates a descending term.
    #[must_use]
    pub fn desc(property: impl Into<String>) -> Self {
        Self::new(property, "desc")
    }
}

/// Compiles order terms into an ORDER BY body (without the keyword).
///
/// Returns an empty string for an empty term list.
///
/// # Errors
///
/// Returns [`QueryError`] for unknown properties or unrecognized direction
/// strings.
pub fn build_order_by(meta: &CollectionMeta, terms: &[OrderTerm]) -> Result<String, QueryError> {
    let mut fragments = Vec::with_capacity(terms.len());
    for term in terms {
        let (column, _) = resolve_property(meta, &term.property)?;
        let direction = term.direction.to_uppercase();
        if direction != "ASC" && direction != "DESC" {
            return Err(QueryError::InvalidDirection {
                direction: term.direction.clone(),
            });
        }
        fragments.push(format!("{column} {direction}"));
    }
    Ok(fragments.join(", "))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves a property through metadata or fails listing known properties.
fn resolve_property<'meta>(
    meta: &'meta CollectionMeta,
    property: &str,
) -> Result<(&'meta str, FieldType), QueryError> {
    meta.resolve(property).ok_or_else(|| QueryError::UnknownProperty {
        property: property.to_string(),
        known: meta.known_properties().join(", "),
    })
}

/// Serializes one filter value for binding.
fn bind_value(
    property: &str,
    value: &FieldValue,
    field_type: FieldType,
) -> Result<SqlValue, QueryError> {
    serialize(value, field_type).map_err(|source| QueryError::Value {
        property: property.to_string(),
        source,
    })
}

/// Returns a comma-separated list of `count` bind markers.
fn markers(count: usize) -> String {
    let mut text = String::with_capacity(count.saturating_mul(3));
    for index in 0 .. count {
        if index > 0 {
            text.push_str(", ");
        }
        text.push('?');
    }
    text
}

/// Returns a LIKE fragment with the declared escape character.
fn like_fragment(column: &str) -> String {
    format!("{column} LIKE ? ESCAPE '{LIKE_ESCAPE}'")
}

/// Escapes LIKE metacharacters in a caller-supplied match value.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        if character == LIKE_ESCAPE || character == '%' || character == '_' {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(character);
    }
    escaped
}
