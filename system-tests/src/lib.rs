// system-tests/src/lib.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared model types and fixtures for end-to-end suites.
// Purpose: Provide registered persisted models and store/loader setup used
//          across the system test files.
// Dependencies: statehouse-core, statehouse-store-sqlite, tempfile
// ============================================================================

//! ## Overview
//! Model types here implement [`Persistable`] by hand, the way an
//! integrating application would: `fresh()` supplies defaults and the two
//! accessor methods map logical property names onto struct fields. Each
//! suite builds its own registry and store so tests stay hermetic.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-support helpers are permitted test-only assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use statehouse_core::CollectionRegistration;
use statehouse_core::FieldType;
use statehouse_core::FieldValue;
use statehouse_core::Persistable;
use statehouse_core::StateRegistration;
use statehouse_core::StateRegistry;
use statehouse_store_sqlite::SqliteStore;
use statehouse_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Singleton Models
// ============================================================================

/// Singleton application settings persisted under table `t1`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    /// Display name; defaults to "default".
    pub name: String,
    /// Counter; defaults to 0.
    pub count: f64,
    /// Scratch value deliberately not declared as a persisted field.
    pub scratch: u32,
}

impl Persistable for AppSettings {
    fn fresh() -> Self {
        Self {
            name: "default".to_string(),
            count: 0.0,
            scratch: 0,
        }
    }

    fn read_field(&self, property: &str) -> Option<FieldValue> {
        match property {
            "name" => Some(FieldValue::String(self.name.clone())),
            "count" => Some(FieldValue::Number(self.count)),
            _ => None,
        }
    }

    fn write_field(&mut self, property: &str, value: FieldValue) -> bool {
        match (property, value) {
            ("name", FieldValue::String(name)) => {
                self.name = name;
                true
            }
            ("count", FieldValue::Number(count)) => {
                self.count = count;
                true
            }
            _ => false,
        }
    }
}

/// Registers [`AppSettings`] with its two declared fields.
pub fn register_app_settings(registry: &StateRegistry) {
    registry
        .register_state::<AppSettings>(
            StateRegistration::new("t1")
                .field("name", FieldType::String)
                .field("count", FieldType::Number),
        )
        .expect("register AppSettings");
}

/// Wider settings model sharing table `t1`, used by migration suites.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSettingsV2 {
    /// Display name; defaults to "default".
    pub name: String,
    /// Counter; defaults to 0.
    pub count: f64,
    /// Field added after the first deploy; defaults to 7.
    pub retries: f64,
}

impl Persistable for AppSettingsV2 {
    fn fresh() -> Self {
        Self {
            name: "default".to_string(),
            count: 0.0,
            retries: 7.0,
        }
    }

    fn read_field(&self, property: &str) -> Option<FieldValue> {
        match property {
            "name" => Some(FieldValue::String(self.name.clone())),
            "count" => Some(FieldValue::Number(self.count)),
            "retries" => Some(FieldValue::Number(self.retries)),
            _ => None,
        }
    }

    fn write_field(&mut self, property: &str, value: FieldValue) -> bool {
        match (property, value) {
            ("name", FieldValue::String(name)) => {
                self.name = name;
                true
            }
            ("count", FieldValue::Number(count)) => {
                self.count = count;
                true
            }
            ("retries", FieldValue::Number(retries)) => {
                self.retries = retries;
                true
            }
            _ => false,
        }
    }
}

/// Registers [`AppSettingsV2`] over the same `t1` table with an extra field.
pub fn register_app_settings_v2(registry: &StateRegistry) {
    registry
        .register_state::<AppSettingsV2>(
            StateRegistration::new("t1")
                .field("name", FieldType::String)
                .field("count", FieldType::Number)
                .field("retries", FieldType::Number),
        )
        .expect("register AppSettingsV2");
}

// ============================================================================
// SECTION: Collection Models
// ============================================================================

/// Collection entity persisted under table `players`.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Caller-supplied primary key.
    pub id: String,
    /// Optional display name; NULL round-trips through this option.
    pub name: Option<String>,
    /// Score; defaults to 0.
    pub score: f64,
    /// Active flag; defaults to false.
    pub active: bool,
    /// Last login, when known.
    pub last_login: Option<OffsetDateTime>,
}

impl Persistable for Player {
    fn fresh() -> Self {
        Self {
            id: String::new(),
            name: None,
            score: 0.0,
            active: false,
            last_login: None,
        }
    }

    fn read_field(&self, property: &str) -> Option<FieldValue> {
        match property {
            "id" => Some(FieldValue::String(self.id.clone())),
            "name" => {
                Some(self.name.clone().map_or(FieldValue::Null, FieldValue::String))
            }
            "score" => Some(FieldValue::Number(self.score)),
            "active" => Some(FieldValue::Boolean(self.active)),
            "lastLogin" => {
                Some(self.last_login.map_or(FieldValue::Null, FieldValue::Date))
            }
            _ => None,
        }
    }

    fn write_field(&mut self, property: &str, value: FieldValue) -> bool {
        match (property, value) {
            ("id", FieldValue::String(id)) => {
                self.id = id;
                true
            }
            ("name", FieldValue::String(name)) => {
                self.name = Some(name);
                true
            }
            ("name", FieldValue::Null) => {
                self.name = None;
                true
            }
            ("score", FieldValue::Number(score)) => {
                self.score = score;
                true
            }
            ("active", FieldValue::Boolean(active)) => {
                self.active = active;
                true
            }
            ("lastLogin", FieldValue::Date(at)) => {
                self.last_login = Some(at);
                true
            }
            ("lastLogin", FieldValue::Null) => {
                self.last_login = None;
                true
            }
            _ => false,
        }
    }
}

/// Registers [`Player`] with a string id and a score/name index.
pub fn register_player(registry: &StateRegistry) {
    registry
        .register_collection::<Player>(
            CollectionRegistration::new("players")
                .id("id", FieldType::String)
                .field("name", FieldType::String)
                .field("score", FieldType::Number)
                .field("active", FieldType::Boolean)
                .field("lastLogin", FieldType::Date)
                .index(&["score"])
                .index(&["name", "score"]),
        )
        .expect("register Player");
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Opens a store on a fresh temporary database file.
pub fn temp_store() -> (TempDir, Arc<SqliteStore>) {
    let dir = TempDir::new().expect("temp dir");
    let config = SqliteStoreConfig::for_path(dir.path().join("statehouse.db"));
    let store = SqliteStore::open(&config).expect("open store");
    (dir, Arc::new(store))
}
