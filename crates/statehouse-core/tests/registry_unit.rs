// crates/statehouse-core/tests/registry_unit.rs
// ============================================================================
// Module: Registry Unit Tests
// Description: Two-phase registration protocol and eager invariant checks.
// Purpose: Validate column derivation, inheritance guards, id declaration
//          counts, and index resolution.
// ============================================================================

//! ## Overview
//! Unit tests for the metadata registry:
//! - snake_case column derivation and explicit overrides
//! - inheritance-of-persisted-type rejection for both patterns
//! - exactly-one-id enforcement for collections
//! - index property resolution and naming
//! - duplicate registration rejection

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use statehouse_core::ClassToken;
use statehouse_core::CollectionRegistration;
use statehouse_core::FieldType;
use statehouse_core::RegistrationError;
use statehouse_core::StateRegistration;
use statehouse_core::StateRegistry;

// ============================================================================
// SECTION: Model Types
// ============================================================================

/// Singleton settings model.
struct Settings;
/// Singleton model declared as extending `Settings`.
struct DerivedSettings;
/// Plain unregistered base type.
struct PlainBase;
/// Singleton model extending an unregistered base.
struct SettingsOverPlainBase;
/// Collection model.
struct Player;
/// Collection model declared as extending `Player`.
struct DerivedPlayer;
/// Collection model used for index checks.
struct Item;

// ============================================================================
// SECTION: Column Derivation
// ============================================================================

#[test]
fn column_names_default_to_snake_case() {
    let registry = StateRegistry::new();
    registry
        .register_state::<Settings>(
            StateRegistration::new("settings")
                .field("displayName", FieldType::String)
                .field("retryCount", FieldType::Number)
                .field_with_column("volume", "volume_level", FieldType::Number),
        )
        .expect("register settings");
    let meta = registry.state_meta::<Settings>().expect("settings meta");
    assert_eq!(meta.table, "settings");
    assert_eq!(meta.field("displayName").expect("field").column, "display_name");
    assert_eq!(meta.field("retryCount").expect("field").column, "retry_count");
    assert_eq!(meta.field("volume").expect("field").column, "volume_level");
}

#[test]
fn rust_style_properties_pass_through_unchanged() {
    let registry = StateRegistry::new();
    registry
        .register_state::<Settings>(
            StateRegistration::new("settings").field("display_name", FieldType::String),
        )
        .expect("register settings");
    let meta = registry.state_meta::<Settings>().expect("settings meta");
    assert_eq!(meta.field("display_name").expect("field").column, "display_name");
}

// ============================================================================
// SECTION: Inheritance Guards
// ============================================================================

#[test]
fn state_type_must_not_extend_state_type() {
    let registry = StateRegistry::new();
    registry
        .register_state::<Settings>(
            StateRegistration::new("settings").field("name", FieldType::String),
        )
        .expect("register base");
    let err = registry
        .register_state::<DerivedSettings>(
            StateRegistration::new("derived_settings")
                .extends(ClassToken::of::<Settings>())
                .field("name", FieldType::String),
        )
        .expect_err("derived registration must fail");
    match err {
        RegistrationError::StateInheritance {
            type_name,
            ancestor_table,
        } => {
            assert_eq!(type_name, "DerivedSettings");
            assert_eq!(ancestor_table, "settings");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn collection_type_must_not_extend_collection_type() {
    let registry = StateRegistry::new();
    registry
        .register_collection::<Player>(
            CollectionRegistration::new("players")
                .id("id", FieldType::String)
                .field("name", FieldType::String),
        )
        .expect("register base collection");
    let err = registry
        .register_collection::<DerivedPlayer>(
            CollectionRegistration::new("derived_players")
                .extends(ClassToken::of::<Player>())
                .id("id", FieldType::String),
        )
        .expect_err("derived registration must fail");
    assert!(matches!(err, RegistrationError::CollectionInheritance { .. }));
    assert!(err.to_string().contains("DerivedPlayer"));
    assert!(err.to_string().contains("players"));
}

#[test]
fn extending_an_unregistered_base_is_allowed() {
    let registry = StateRegistry::new();
    registry
        .register_state::<SettingsOverPlainBase>(
            StateRegistration::new("settings")
                .extends(ClassToken::of::<PlainBase>())
                .field("name", FieldType::String),
        )
        .expect("unregistered base must be allowed");
}

// ============================================================================
// SECTION: Id Declarations
// ============================================================================

#[test]
fn collection_requires_exactly_one_id() {
    let registry = StateRegistry::new();
    let err = registry
        .register_collection::<Player>(
            CollectionRegistration::new("players").field("name", FieldType::String),
        )
        .expect_err("missing id must fail");
    assert!(matches!(err, RegistrationError::MissingId { .. }));
    assert!(err.to_string().contains("exactly one id field"));
}

#[test]
fn collection_rejects_multiple_ids() {
    let registry = StateRegistry::new();
    let err = registry
        .register_collection::<Player>(
            CollectionRegistration::new("players")
                .id("id", FieldType::String)
                .id("other", FieldType::Number),
        )
        .expect_err("multiple ids must fail");
    assert!(matches!(err, RegistrationError::MultipleIds { .. }));
    assert!(err.to_string().contains("Player"));
}

// ============================================================================
// SECTION: Indices
// ============================================================================

#[test]
fn index_properties_resolve_to_columns_in_order() {
    let registry = StateRegistry::new();
    registry
        .register_collection::<Item>(
            CollectionRegistration::new("items")
                .id("id", FieldType::Number)
                .field("ownerName", FieldType::String)
                .field("slot", FieldType::Number)
                .index(&["ownerName", "slot"]),
        )
        .expect("register items");
    let meta = registry.collection_meta::<Item>().expect("items meta");
    assert_eq!(meta.indices.len(), 1);
    assert_eq!(meta.indices[0].columns, vec!["owner_name".to_string(), "slot".to_string()]);
    assert_eq!(meta.indices[0].index_name("items"), "items_idx_owner_name_slot");
}

#[test]
fn index_over_unknown_property_is_rejected() {
    let registry = StateRegistry::new();
    let err = registry
        .register_collection::<Item>(
            CollectionRegistration::new("items")
                .id("id", FieldType::Number)
                .index(&["missing"]),
        )
        .expect_err("unknown index property must fail");
    assert!(matches!(err, RegistrationError::UnknownIndexProperty { .. }));
    assert!(err.to_string().contains("missing"));
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[test]
fn duplicate_registration_is_rejected() {
    let registry = StateRegistry::new();
    registry
        .register_state::<Settings>(
            StateRegistration::new("settings").field("name", FieldType::String),
        )
        .expect("first registration");
    let err = registry
        .register_state::<Settings>(
            StateRegistration::new("settings").field("name", FieldType::String),
        )
        .expect_err("second registration must fail");
    assert!(matches!(err, RegistrationError::AlreadyRegistered { .. }));
}

#[test]
fn lookup_distinguishes_patterns() {
    let registry = StateRegistry::new();
    registry
        .register_state::<Settings>(
            StateRegistration::new("settings").field("name", FieldType::String),
        )
        .expect("register state");
    registry
        .register_collection::<Player>(
            CollectionRegistration::new("players").id("id", FieldType::String),
        )
        .expect("register collection");
    assert!(registry.state_meta::<Settings>().is_some());
    assert!(registry.collection_meta::<Settings>().is_none());
    assert!(registry.collection_meta::<Player>().is_some());
    assert!(registry.state_meta::<Player>().is_none());
    assert!(registry.is_collection::<Player>());
    assert!(!registry.is_collection::<Settings>());
}
