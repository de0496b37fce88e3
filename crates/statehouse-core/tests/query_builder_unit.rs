// crates/statehouse-core/tests/query_builder_unit.rs
// ============================================================================
// Module: Query Builder Unit Tests
// Description: Predicate and order-by construction edge cases.
// Purpose: Validate parameterization, empty-list semantics, wildcard
//          escaping, and error paths.
// ============================================================================

//! ## Overview
//! Unit tests for the query builder:
//! - AND-joined parameterized predicates in declaration order
//! - `In []` / `NotIn []` degenerate predicates
//! - LIKE metacharacter escaping for string-match operators
//! - unknown-property and invalid-direction error paths
//! - date values binding as ISO text

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use statehouse_core::CollectionMeta;
use statehouse_core::Condition;
use statehouse_core::FieldMeta;
use statehouse_core::FieldType;
use statehouse_core::FieldValue;
use statehouse_core::Filter;
use statehouse_core::OrderTerm;
use statehouse_core::QueryError;
use statehouse_core::SqlValue;
use statehouse_core::query::build_order_by;
use statehouse_core::query::build_predicate;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds collection metadata for a small player table.
fn player_meta() -> CollectionMeta {
    CollectionMeta {
        table: "players".to_string(),
        id: FieldMeta {
            property: "id".to_string(),
            column: "id".to_string(),
            field_type: FieldType::String,
        },
        fields: vec![
            FieldMeta {
                property: "name".to_string(),
                column: "name".to_string(),
                field_type: FieldType::String,
            },
            FieldMeta {
                property: "score".to_string(),
                column: "score".to_string(),
                field_type: FieldType::Number,
            },
            FieldMeta {
                property: "joinedAt".to_string(),
                column: "joined_at".to_string(),
                field_type: FieldType::Date,
            },
        ],
        indices: Vec::new(),
    }
}

// ============================================================================
// SECTION: Predicates
// ============================================================================

#[test]
fn clauses_join_with_and_in_declaration_order() {
    let meta = player_meta();
    let filter = Filter::new()
        .value("name", "alice")
        .condition("score", Condition::Gte(FieldValue::Number(10.0)));
    let predicate = build_predicate(&meta, &filter).expect("predicate");
    assert_eq!(predicate.sql, "name = ? AND score >= ?");
    assert_eq!(predicate.params, vec![
        SqlValue::Text("alice".to_string()),
        SqlValue::Real(10.0)
    ]);
}

#[test]
fn empty_filter_compiles_to_empty_predicate() {
    let meta = player_meta();
    let predicate = build_predicate(&meta, &Filter::new()).expect("predicate");
    assert!(predicate.sql.is_empty());
    assert!(predicate.params.is_empty());
}

#[test]
fn skipped_conditions_are_omitted_entirely() {
    let meta = player_meta();
    let filter = Filter::new()
        .maybe("name", None)
        .maybe("score", Some(Condition::Lt(FieldValue::Number(5.0))));
    let predicate = build_predicate(&meta, &filter).expect("predicate");
    assert_eq!(predicate.sql, "score < ?");
    assert_eq!(predicate.params, vec![SqlValue::Real(5.0)]);
}

#[test]
fn in_over_empty_list_matches_nothing() {
    let meta = player_meta();
    let filter = Filter::new().condition("name", Condition::In(Vec::new()));
    let predicate = build_predicate(&meta, &filter).expect("predicate");
    assert_eq!(predicate.sql, "0 = 1");
    assert!(predicate.params.is_empty());
}

#[test]
fn not_in_over_empty_list_matches_everything() {
    let meta = player_meta();
    let filter = Filter::new().condition("name", Condition::NotIn(Vec::new()));
    let predicate = build_predicate(&meta, &filter).expect("predicate");
    assert_eq!(predicate.sql, "1 = 1");
    assert!(predicate.params.is_empty());
}

#[test]
fn in_over_values_emits_one_marker_per_value() {
    let meta = player_meta();
    let filter = Filter::new().condition(
        "name",
        Condition::In(vec![FieldValue::from("a"), FieldValue::from("b")]),
    );
    let predicate = build_predicate(&meta, &filter).expect("predicate");
    assert_eq!(predicate.sql, "name IN (?, ?)");
    assert_eq!(predicate.params.len(), 2);
}

#[test]
fn null_checks_bind_no_parameters() {
    let meta = player_meta();
    let filter = Filter::new()
        .condition("name", Condition::IsNull)
        .condition("score", Condition::IsNotNull);
    let predicate = build_predicate(&meta, &filter).expect("predicate");
    assert_eq!(predicate.sql, "name IS NULL AND score IS NOT NULL");
    assert!(predicate.params.is_empty());
}

#[test]
fn timestamp_properties_are_filterable() {
    let meta = player_meta();
    let boundary = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
    let filter =
        Filter::new().condition("created_at", Condition::Gte(FieldValue::Date(boundary)));
    let predicate = build_predicate(&meta, &filter).expect("predicate");
    assert_eq!(predicate.sql, "created_at >= ?");
    assert_eq!(predicate.params, vec![SqlValue::Text(
        "2023-11-14T22:13:20.000Z".to_string()
    )]);
}

// ============================================================================
// SECTION: String Matching
// ============================================================================

#[test]
fn contains_escapes_like_metacharacters() {
    let meta = player_meta();
    let filter =
        Filter::new().condition("name", Condition::Contains("50%_done\\maybe".to_string()));
    let predicate = build_predicate(&meta, &filter).expect("predicate");
    assert_eq!(predicate.sql, "name LIKE ? ESCAPE '\\'");
    assert_eq!(predicate.params, vec![SqlValue::Text(
        "%50\\%\\_done\\\\maybe%".to_string()
    )]);
}

#[test]
fn starts_with_and_ends_with_anchor_one_side() {
    let meta = player_meta();
    let starts = build_predicate(
        &meta,
        &Filter::new().condition("name", Condition::StartsWith("al".to_string())),
    )
    .expect("starts predicate");
    assert_eq!(starts.params, vec![SqlValue::Text("al%".to_string())]);
    let ends = build_predicate(
        &meta,
        &Filter::new().condition("name", Condition::EndsWith("ce".to_string())),
    )
    .expect("ends predicate");
    assert_eq!(ends.params, vec![SqlValue::Text("%ce".to_string())]);
}

// ============================================================================
// SECTION: Error Paths
// ============================================================================

#[test]
fn unknown_property_lists_known_properties() {
    let meta = player_meta();
    let filter = Filter::new().value("missing", "x");
    let err = build_predicate(&meta, &filter).expect_err("unknown property must fail");
    let QueryError::UnknownProperty {
        property,
        known,
    } = err
    else {
        panic!("unexpected error kind");
    };
    assert_eq!(property, "missing");
    for expected in ["id", "name", "score", "joinedAt", "created_at", "updated_at"] {
        assert!(known.contains(expected), "known list misses {expected}: {known}");
    }
}

#[test]
fn nan_filter_value_is_rejected() {
    let meta = player_meta();
    let filter = Filter::new().value("score", f64::NAN);
    let err = build_predicate(&meta, &filter).expect_err("NaN filter value must fail");
    assert!(matches!(err, QueryError::Value { .. }));
}

// ============================================================================
// SECTION: Order Terms
// ============================================================================

#[test]
fn order_terms_normalize_direction_to_uppercase() {
    let meta = player_meta();
    let order = build_order_by(&meta, &[
        OrderTerm::new("score", "desc"),
        OrderTerm::new("joinedAt", "Asc"),
    ])
    .expect("order by");
    assert_eq!(order, "score DESC, joined_at ASC");
}

#[test]
fn empty_order_spec_compiles_to_empty_string() {
    let meta = player_meta();
    assert!(build_order_by(&meta, &[]).expect("order by").is_empty());
}

#[test]
fn invalid_direction_is_rejected() {
    let meta = player_meta();
    let err = build_order_by(&meta, &[OrderTerm::new("score", "sideways")])
        .expect_err("invalid direction must fail");
    let QueryError::InvalidDirection {
        direction,
    } = err
    else {
        panic!("unexpected error kind");
    };
    assert_eq!(direction, "sideways");
}

#[test]
fn order_terms_share_the_property_error_path() {
    let meta = player_meta();
    let err = build_order_by(&meta, &[OrderTerm::asc("missing")])
        .expect_err("unknown order property must fail");
    assert!(matches!(err, QueryError::UnknownProperty { .. }));
}
