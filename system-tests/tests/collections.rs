// system-tests/tests/collections.rs
// ============================================================================
// Module: Collection System Tests
// Description: End-to-end collection CRUD, query, and bulk behavior.
// Purpose: Validate create/get/find/count, bound save/delete, upsert
//          timestamp semantics, bulk guards, and modify.
// ============================================================================

//! ## Overview
//! End-to-end suites for the collection surface:
//! - create inserts with both timestamps and propagates duplicate-id
//!   constraint errors verbatim
//! - get reflects stored NULLs exactly
//! - find supports predicates, ordering, limit, and offset
//! - upsert preserves `created_at` while refreshing `updated_at`
//! - update_where rejects empty predicates; delete_where permits them
//! - modify applies a read-modify-write cycle and reports missing ids
//! - declared indices exist with deterministic names

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    clippy::float_cmp,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use statehouse_core::Condition;
use statehouse_core::Database;
use statehouse_core::DbError;
use statehouse_core::FieldValue;
use statehouse_core::Filter;
use statehouse_core::FindOptions;
use statehouse_core::OrderTerm;
use statehouse_core::SqlValue;
use statehouse_core::StateError;
use statehouse_core::StateLoader;
use statehouse_core::StateRegistry;
use statehouse_core::Updates;
use statehouse_store_sqlite::SqliteStore;
use system_tests::AppSettings;
use system_tests::Player;
use system_tests::register_app_settings;
use system_tests::register_player;
use system_tests::temp_store;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a loader and registry with the player collection registered.
fn player_loader() -> (tempfile::TempDir, Arc<SqliteStore>, StateLoader<SqliteStore>) {
    let (dir, store) = temp_store();
    let registry = Arc::new(StateRegistry::new());
    register_player(&registry);
    let loader = StateLoader::new(Arc::clone(&store), registry).expect("loader");
    (dir, store, loader)
}

/// Builds a player entity with the given id, name, and score.
fn player(id: &str, name: &str, score: f64) -> Player {
    Player {
        id: id.to_string(),
        name: Some(name.to_string()),
        score,
        active: true,
        last_login: None,
    }
}

/// Reads one timestamp column for a player row.
fn stored_timestamp(store: &SqliteStore, id: &str, column: &str) -> String {
    let row = store
        .query_one(&format!("SELECT {column} FROM players WHERE id = ?"), &[SqlValue::Text(
            id.to_string(),
        )])
        .expect("query players")
        .expect("row present");
    let Some(SqlValue::Text(text)) = row.get(column) else {
        panic!("{column} must be text");
    };
    text.clone()
}

// ============================================================================
// SECTION: Create and Get
// ============================================================================

#[test]
fn create_inserts_row_with_both_timestamps() {
    let (_dir, store, loader) = player_loader();
    let bound = loader.create(player("p1", "alice", 10.0)).expect("create");
    assert_eq!(bound.id(), &SqlValue::Text("p1".to_string()));
    let created_at = stored_timestamp(&store, "p1", "created_at");
    let updated_at = stored_timestamp(&store, "p1", "updated_at");
    assert!(created_at.ends_with('Z'));
    assert_eq!(created_at, updated_at);
}

#[test]
fn duplicate_id_propagates_native_constraint_error() {
    let (_dir, _store, loader) = player_loader();
    loader.create(player("p1", "alice", 10.0)).expect("first create");
    let err = loader.create(player("p1", "bob", 20.0)).expect_err("duplicate must fail");
    let StateError::Db(DbError::Constraint(message)) = err else {
        panic!("expected constraint error, got {err}");
    };
    assert!(message.to_lowercase().contains("unique"), "native message lost: {message}");
}

#[test]
fn get_returns_none_for_missing_ids() {
    let (_dir, _store, loader) = player_loader();
    assert!(loader.get::<Player>("missing").expect("get").is_none());
}

#[test]
fn get_reflects_stored_nulls_exactly() {
    let (_dir, _store, loader) = player_loader();
    loader
        .create(Player {
            id: "p1".to_string(),
            name: None,
            score: 3.0,
            active: false,
            last_login: None,
        })
        .expect("create");
    let fetched = loader.get::<Player>("p1").expect("get").expect("row present");
    assert_eq!(fetched.name, None);
    assert_eq!(fetched.last_login, None);
    assert_eq!(fetched.score, 3.0);
}

// ============================================================================
// SECTION: Bound Save and Delete
// ============================================================================

#[test]
fn bound_save_writes_field_changes() {
    let (_dir, _store, loader) = player_loader();
    let mut bound = loader.create(player("p1", "alice", 10.0)).expect("create");
    bound.score = 99.0;
    bound.name = None;
    bound.save().expect("save");
    let fetched = loader.get::<Player>("p1").expect("get").expect("row present");
    assert_eq!(fetched.score, 99.0);
    assert_eq!(fetched.name, None);
}

#[test]
fn bound_save_refreshes_updated_at_only() {
    let (_dir, store, loader) = player_loader();
    let bound = loader.create(player("p1", "alice", 10.0)).expect("create");
    let created_before = stored_timestamp(&store, "p1", "created_at");
    let updated_before = stored_timestamp(&store, "p1", "updated_at");
    sleep(Duration::from_millis(10));
    bound.save().expect("save");
    assert_eq!(stored_timestamp(&store, "p1", "created_at"), created_before);
    assert_ne!(stored_timestamp(&store, "p1", "updated_at"), updated_before);
}

#[test]
fn bound_delete_removes_the_row() {
    let (_dir, _store, loader) = player_loader();
    let bound = loader.create(player("p1", "alice", 10.0)).expect("create");
    bound.delete().expect("delete");
    assert!(loader.get::<Player>("p1").expect("get").is_none());
}

#[test]
fn bound_identity_survives_in_memory_id_mutation() {
    let (_dir, _store, loader) = player_loader();
    let mut bound = loader.create(player("p1", "alice", 10.0)).expect("create");
    bound.id = "p2".to_string();
    bound.score = 50.0;
    bound.save().expect("save");
    // The save targeted the identity captured at bind time.
    let original = loader.get::<Player>("p1").expect("get").expect("row present");
    assert_eq!(original.score, 50.0);
    assert!(loader.get::<Player>("p2").expect("get").is_none());
}

// ============================================================================
// SECTION: Find and Count
// ============================================================================

#[test]
fn find_filters_orders_and_limits() {
    let (_dir, _store, loader) = player_loader();
    for (id, name, score) in
        [("p1", "alice", 10.0), ("p2", "bob", 30.0), ("p3", "carol", 20.0)]
    {
        loader.create(player(id, name, score)).expect("create");
    }
    let found = loader
        .find::<Player>(&FindOptions {
            filter: Filter::new().condition("score", Condition::Gte(FieldValue::Number(15.0))),
            order_by: vec![OrderTerm::desc("score")],
            limit: Some(1),
            offset: None,
        })
        .expect("find");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "p2");
    let paged = loader
        .find::<Player>(&FindOptions {
            filter: Filter::new(),
            order_by: vec![OrderTerm::asc("score")],
            limit: Some(2),
            offset: Some(1),
        })
        .expect("find page");
    assert_eq!(paged.len(), 2);
    assert_eq!(paged[0].id, "p3");
    assert_eq!(paged[1].id, "p2");
}

#[test]
fn count_matches_predicate_without_materializing() {
    let (_dir, _store, loader) = player_loader();
    for (id, score) in [("p1", 10.0), ("p2", 30.0), ("p3", 20.0)] {
        loader.create(player(id, "x", score)).expect("create");
    }
    assert_eq!(loader.count::<Player>(&Filter::new()).expect("count all"), 3);
    let filtered = loader
        .count::<Player>(
            &Filter::new().condition("score", Condition::Gt(FieldValue::Number(15.0))),
        )
        .expect("count filtered");
    assert_eq!(filtered, 2);
}

#[test]
fn contains_matches_literal_wildcards_only() {
    let (_dir, _store, loader) = player_loader();
    loader.create(player("p1", "100%_done", 1.0)).expect("create");
    loader.create(player("p2", "100 done", 1.0)).expect("create");
    let found = loader
        .find::<Player>(&FindOptions {
            filter: Filter::new().condition("name", Condition::Contains("0%_d".to_string())),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        })
        .expect("find");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "p1");
}

// ============================================================================
// SECTION: Upsert
// ============================================================================

#[test]
fn upsert_preserves_created_at_and_refreshes_updated_at() {
    let (_dir, store, loader) = player_loader();
    loader.create(player("p1", "alice", 10.0)).expect("create");
    let created_before = stored_timestamp(&store, "p1", "created_at");
    let updated_before = stored_timestamp(&store, "p1", "updated_at");
    sleep(Duration::from_millis(10));
    loader.upsert(player("p1", "bob", 42.0)).expect("upsert");
    let fetched = loader.get::<Player>("p1").expect("get").expect("row present");
    assert_eq!(fetched.name, Some("bob".to_string()));
    assert_eq!(fetched.score, 42.0);
    assert_eq!(stored_timestamp(&store, "p1", "created_at"), created_before);
    assert_ne!(stored_timestamp(&store, "p1", "updated_at"), updated_before);
}

#[test]
fn upsert_inserts_when_the_id_is_new() {
    let (_dir, _store, loader) = player_loader();
    loader.upsert(player("p9", "zoe", 5.0)).expect("upsert");
    let fetched = loader.get::<Player>("p9").expect("get").expect("row present");
    assert_eq!(fetched.name, Some("zoe".to_string()));
}

// ============================================================================
// SECTION: Bulk Operations
// ============================================================================

#[test]
fn update_where_rejects_empty_predicates() {
    let (_dir, _store, loader) = player_loader();
    let err = loader
        .update_where::<Player>(&Filter::new(), &Updates::new().set("score", 0.0))
        .expect_err("empty predicate must fail");
    assert_eq!(err, StateError::EmptyUpdateFilter);
    assert!(err.to_string().contains("at least one WHERE condition"));
}

#[test]
fn update_where_skips_unknown_properties_and_sets_updated_at() {
    let (_dir, store, loader) = player_loader();
    loader.create(player("p1", "alice", 10.0)).expect("create");
    let updated_before = stored_timestamp(&store, "p1", "updated_at");
    sleep(Duration::from_millis(10));
    let affected = loader
        .update_where::<Player>(
            &Filter::new().value("id", "p1"),
            &Updates::new().set("score", 77.0).set("nonexistent", "ignored"),
        )
        .expect("update_where");
    assert_eq!(affected, 1);
    let fetched = loader.get::<Player>("p1").expect("get").expect("row present");
    assert_eq!(fetched.score, 77.0);
    assert_ne!(stored_timestamp(&store, "p1", "updated_at"), updated_before);
}

#[test]
fn update_where_reports_affected_row_counts() {
    let (_dir, _store, loader) = player_loader();
    for (id, score) in [("p1", 10.0), ("p2", 30.0), ("p3", 20.0)] {
        loader.create(player(id, "x", score)).expect("create");
    }
    let affected = loader
        .update_where::<Player>(
            &Filter::new().condition("score", Condition::Gte(FieldValue::Number(20.0))),
            &Updates::new().set("active", false),
        )
        .expect("update_where");
    assert_eq!(affected, 2);
}

#[test]
fn delete_where_permits_empty_filters_as_delete_all() {
    let (_dir, _store, loader) = player_loader();
    for id in ["p1", "p2", "p3"] {
        loader.create(player(id, "x", 1.0)).expect("create");
    }
    let affected = loader.delete_where::<Player>(&Filter::new()).expect("delete all");
    assert_eq!(affected, 3);
    assert_eq!(loader.count::<Player>(&Filter::new()).expect("count"), 0);
}

#[test]
fn delete_where_applies_predicates() {
    let (_dir, _store, loader) = player_loader();
    for (id, score) in [("p1", 10.0), ("p2", 30.0)] {
        loader.create(player(id, "x", score)).expect("create");
    }
    let affected = loader
        .delete_where::<Player>(
            &Filter::new().condition("score", Condition::Lt(FieldValue::Number(20.0))),
        )
        .expect("delete_where");
    assert_eq!(affected, 1);
    assert!(loader.get::<Player>("p1").expect("get").is_none());
    assert!(loader.get::<Player>("p2").expect("get").is_some());
}

// ============================================================================
// SECTION: Modify
// ============================================================================

#[test]
fn modify_applies_read_modify_write() {
    let (_dir, _store, loader) = player_loader();
    loader.create(player("p1", "alice", 10.0)).expect("create");
    let bound = loader
        .modify::<Player>("p1", |entity| {
            entity.score += 5.0;
        })
        .expect("modify");
    assert_eq!(bound.score, 15.0);
    let fetched = loader.get::<Player>("p1").expect("get").expect("row present");
    assert_eq!(fetched.score, 15.0);
}

#[test]
fn modify_reports_missing_rows_by_type_and_id() {
    let (_dir, _store, loader) = player_loader();
    let err =
        loader.modify::<Player>("ghost", |_entity| {}).expect_err("missing row must fail");
    let StateError::NotFound {
        type_name,
        id,
    } = err
    else {
        panic!("expected NotFound");
    };
    assert_eq!(type_name, "Player");
    assert_eq!(id, "ghost");
}

// ============================================================================
// SECTION: Guards and Schema
// ============================================================================

#[test]
fn collection_api_refuses_non_collection_types() {
    let (_dir, store) = temp_store();
    let registry = Arc::new(StateRegistry::new());
    register_app_settings(&registry);
    let loader = StateLoader::new(Arc::clone(&store), registry).expect("loader");
    let err = loader.get::<AppSettings>("k1").expect_err("get must fail");
    assert!(err.to_string().contains("not registered as a persisted collection"));
}

#[test]
fn declared_indices_exist_with_deterministic_names() {
    let (_dir, store, loader) = player_loader();
    loader.create(player("p1", "alice", 10.0)).expect("create");
    let rows = store
        .query_all(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'players'",
            &[],
        )
        .expect("query indices");
    let names: Vec<String> = rows
        .iter()
        .filter_map(|row| match row.get("name") {
            Some(SqlValue::Text(name)) => Some(name.clone()),
            _ => None,
        })
        .collect();
    assert!(names.contains(&"players_idx_score".to_string()), "indices: {names:?}");
    assert!(names.contains(&"players_idx_name_score".to_string()), "indices: {names:?}");
}
