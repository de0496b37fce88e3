// crates/statehouse-core/src/loader.rs
// ============================================================================
// Module: State Loader
// Description: Façade over serialization, metadata, schema, and queries.
// Purpose: Provide singleton load/auto-save semantics and collection
//          CRUD/bulk/transactional operations over one database handle.
// Dependencies: crate::database, crate::debounce, crate::meta, crate::query,
//               crate::schema, crate::serialize
// ============================================================================

//! ## Overview
//! [`StateLoader`] ties the persistence components together. Singleton
//! state loads through [`StateLoader::load`] into a [`StateHandle`] whose
//! mutations schedule debounced full-row saves; collection entities bind
//! through `create`/`get`/`find`/`upsert` into [`Bound`] values carrying
//! working `save()`/`delete()` methods closed over the row identity.
//!
//! Every entry point re-resolves metadata and re-runs the idempotent schema
//! path (ensure + additive migration, plus indices for collections), so the
//! physical schema converges on every call and rolling deploys observe no
//! data loss.
//!
//! Model types implement [`Persistable`]: an explicit accessor layer
//! (`fresh`/`read_field`/`write_field`) standing in for transparent property
//! interception. Declared-field snapshots taken around a
//! [`StateHandle::update`] call decide whether a save is scheduled, so
//! mutations of undeclared struct members never trigger writes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::database::Database;
use crate::database::DbError;
use crate::debounce::DebounceHandle;
use crate::debounce::DebounceStatsSnapshot;
use crate::debounce::PendingStatement;
use crate::debounce::SaveKey;
use crate::debounce::spawn_debounce_runtime;
use crate::error::StateError;
use crate::meta::CREATED_AT_COLUMN;
use crate::meta::CollectionMeta;
use crate::meta::FieldMeta;
use crate::meta::KEY_COLUMN;
use crate::meta::StateMeta;
use crate::meta::StateRegistry;
use crate::meta::UPDATED_AT_COLUMN;
use crate::meta::short_type_name;
use crate::query::Filter;
use crate::query::OrderTerm;
use crate::query::build_order_by;
use crate::query::build_predicate;
use crate::schema::NOW_EXPR;
use crate::schema::ensure_collection_table;
use crate::schema::ensure_indices;
use crate::schema::ensure_state_table;
use crate::schema::migrate_collection_additive;
use crate::schema::migrate_state_additive;
use crate::serialize::deserialize;
use crate::serialize::serialize;
use crate::value::FieldValue;
use crate::value::SqlRow;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default debounce quiet period in milliseconds.
const DEFAULT_DEBOUNCE_DELAY_MS: u64 = 100;

// ============================================================================
// SECTION: Model Binding
// ============================================================================

/// Explicit accessor layer connecting a model type to its declared fields.
///
/// # Invariants
/// - `read_field` returns `None` only for undeclared properties; declared
///   properties without a meaningful value return [`FieldValue::Null`].
/// - `write_field` returns false (and leaves the instance untouched) for
///   undeclared properties.
pub trait Persistable: Send + 'static {
    /// Returns a fresh instance carrying the type's default field values.
    fn fresh() -> Self;

    /// Reads the current value of a declared property.
    fn read_field(&self, property: &str) -> Option<FieldValue>;

    /// Writes a declared property; returns true when the write applied.
    fn write_field(&mut self, property: &str, value: FieldValue) -> bool;
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for a [`StateLoader`].
///
/// # Invariants
/// - `debounce_delay_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct StateLoaderConfig {
    /// Debounce quiet period in milliseconds.
    #[serde(default = "default_debounce_delay_ms")]
    pub debounce_delay_ms: u64,
}

impl Default for StateLoaderConfig {
    fn default() -> Self {
        Self {
            debounce_delay_ms: DEFAULT_DEBOUNCE_DELAY_MS,
        }
    }
}

/// Returns the default debounce quiet period.
const fn default_debounce_delay_ms() -> u64 {
    DEFAULT_DEBOUNCE_DELAY_MS
}

// ============================================================================
// SECTION: Bulk Operation Inputs
// ============================================================================

/// Options for [`StateLoader::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Row filter; empty means every row.
    pub filter: Filter,
    /// Order terms; empty means store-native order (not to be relied upon).
    pub order_by: Vec<OrderTerm>,
    /// Maximum rows to return.
    pub limit: Option<u64>,
    /// Rows to skip; applies only together with `limit`.
    pub offset: Option<u64>,
}

/// Ordered field assignments for [`StateLoader::update_where`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates {
    /// Assignments in declaration order.
    entries: Vec<(String, FieldValue)>,
}

impl Updates {
    /// Creates an empty assignment list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one field assignment.
    #[must_use]
    pub fn set(mut self, property: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.entries.push((property.into(), value.into()));
        self
    }

    /// Returns true when no assignments were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the assignments in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[(String, FieldValue)] {
        &self.entries
    }
}

// ============================================================================
// SECTION: Loader
// ============================================================================

/// Façade over metadata, schema, serialization, queries, and the debounce
/// writer runtime.
///
/// # Invariants
/// - One shared database handle serves every operation, including the
///   background debounce thread.
/// - Dropping the loader requests a graceful runtime shutdown that drains
///   pending debounced saves.
pub struct StateLoader<D: Database + 'static> {
    /// Shared database handle.
    database: Arc<D>,
    /// Shared persistence metadata registry.
    registry: Arc<StateRegistry>,
    /// Debounce writer runtime handle.
    debounce: DebounceHandle,
}

impl<D: Database + 'static> StateLoader<D> {
    /// Creates a loader with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the debounce runtime cannot start.
    pub fn new(database: Arc<D>, registry: Arc<StateRegistry>) -> Result<Self, StateError> {
        Self::with_config(database, registry, StateLoaderConfig::default())
    }

    /// Creates a loader with an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the debounce runtime cannot start.
    pub fn with_config(
        database: Arc<D>,
        registry: Arc<StateRegistry>,
        config: StateLoaderConfig,
    ) -> Result<Self, StateError> {
        let debounce = spawn_debounce_runtime(
            Arc::clone(&database),
            Duration::from_millis(config.debounce_delay_ms),
        )?;
        Ok(Self {
            database,
            registry,
            debounce,
        })
    }

    /// Returns a snapshot of the debounce writer counters.
    #[must_use]
    pub fn debounce_stats(&self) -> DebounceStatsSnapshot {
        self.debounce.stats_snapshot()
    }

    // ------------------------------------------------------------------
    // Singleton surface
    // ------------------------------------------------------------------

    /// Loads (or initializes) the singleton row for `key`.
    ///
    /// An existing row hydrates the fresh instance field by field; stored
    /// NULL columns (for example freshly migrated ones) leave the in-memory
    /// default untouched. A missing row inserts the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for unregistered types, for types registered
    /// as collections, and for schema or row access failures.
    pub fn load<T: Persistable>(&self, key: &str) -> Result<StateHandle<T>, StateError> {
        let meta = self.resolve_state_meta::<T>()?;
        ensure_state_table(self.database.as_ref(), &meta)?;
        migrate_state_additive(self.database.as_ref(), &meta)?;
        let select = format!("SELECT * FROM {} WHERE {KEY_COLUMN} = ?", meta.table);
        let row = self.database.query_one(&select, &[SqlValue::Text(key.to_string())])?;
        let mut state = T::fresh();
        match row {
            Some(row) => {
                for field in &meta.fields {
                    let Some(value) = row.get(&field.column) else {
                        continue;
                    };
                    if value.is_null() {
                        continue;
                    }
                    let hydrated = deserialize(value, field.field_type)?;
                    let _ = state.write_field(&field.property, hydrated);
                }
            }
            None => {
                let snapshot = snapshot_fields(&state, &meta.fields)?;
                let mut columns = vec![KEY_COLUMN.to_string()];
                let mut markers = vec!["?".to_string()];
                let mut params = vec![SqlValue::Text(key.to_string())];
                for (column, value) in snapshot {
                    columns.push(column);
                    markers.push("?".to_string());
                    params.push(value);
                }
                columns.push(UPDATED_AT_COLUMN.to_string());
                markers.push(NOW_EXPR.to_string());
                let insert = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    meta.table,
                    columns.join(", "),
                    markers.join(", ")
                );
                self.database.execute(&insert, &params)?;
            }
        }
        Ok(StateHandle {
            state,
            key: key.to_string(),
            meta,
            debounce: self.debounce.clone(),
        })
    }

    /// Returns true when a singleton row exists for `key`; never inserts.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for the same misuse and access failures as
    /// [`StateLoader::load`].
    pub fn exists<T: Persistable>(&self, key: &str) -> Result<bool, StateError> {
        let meta = self.resolve_state_meta::<T>()?;
        ensure_state_table(self.database.as_ref(), &meta)?;
        migrate_state_additive(self.database.as_ref(), &meta)?;
        let select = format!("SELECT 1 AS present FROM {} WHERE {KEY_COLUMN} = ?", meta.table);
        let row = self.database.query_one(&select, &[SqlValue::Text(key.to_string())])?;
        Ok(row.is_some())
    }

    /// Executes every pending debounced save immediately.
    ///
    /// Safe to call with zero pending saves.
    ///
    /// # Errors
    ///
    /// Returns the first save execution error, if any.
    pub fn flush(&self) -> Result<(), StateError> {
        self.debounce.flush().map_err(StateError::from)
    }

    // ------------------------------------------------------------------
    // Collection surface
    // ------------------------------------------------------------------

    /// Inserts a new collection row from `entity` and binds it.
    ///
    /// Both timestamp columns are server-set to now. A duplicate id
    /// propagates the engine's native constraint violation.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for misuse, serialization, or execution
    /// failures, including [`DbError::Constraint`] for duplicate ids.
    pub fn create<T: Persistable>(&self, entity: T) -> Result<Bound<T, D>, StateError> {
        let meta = self.collection_context::<T>()?;
        let id = serialize_id(&entity, &meta)?;
        let snapshot = snapshot_fields(&entity, &meta.fields)?;
        let mut columns = vec![meta.id.column.clone()];
        let mut markers = vec!["?".to_string()];
        let mut params = vec![id.clone()];
        for (column, value) in snapshot {
            columns.push(column);
            markers.push("?".to_string());
            params.push(value);
        }
        columns.push(CREATED_AT_COLUMN.to_string());
        markers.push(NOW_EXPR.to_string());
        columns.push(UPDATED_AT_COLUMN.to_string());
        markers.push(NOW_EXPR.to_string());
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            meta.table,
            columns.join(", "),
            markers.join(", ")
        );
        self.database.execute(&insert, &params)?;
        Ok(Bound {
            entity,
            id,
            meta,
            database: Arc::clone(&self.database),
        })
    }

    /// Fetches one row by id; returns `None` when absent.
    ///
    /// Hydration reflects exactly what is stored, including NULLs.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for misuse, serialization, or access
    /// failures.
    pub fn get<T: Persistable>(
        &self,
        id: impl Into<FieldValue>,
    ) -> Result<Option<Bound<T, D>>, StateError> {
        let meta = self.collection_context::<T>()?;
        let id_value = serialize(&id.into(), meta.id.field_type)?;
        let select = format!("SELECT * FROM {} WHERE {} = ?", meta.table, meta.id.column);
        let Some(row) = self.database.query_one(&select, &[id_value.clone()])? else {
            return Ok(None);
        };
        let entity = hydrate_collection::<T>(&meta, &row)?;
        Ok(Some(Bound {
            entity,
            id: id_value,
            meta,
            database: Arc::clone(&self.database),
        }))
    }

    /// Queries rows matching `options` and binds each result.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for misuse, predicate/order construction, or
    /// access failures.
    pub fn find<T: Persistable>(
        &self,
        options: &FindOptions,
    ) -> Result<Vec<Bound<T, D>>, StateError> {
        let meta = self.collection_context::<T>()?;
        let predicate = build_predicate(&meta, &options.filter)?;
        let order = build_order_by(&meta, &options.order_by)?;
        let mut sql = format!("SELECT * FROM {}", meta.table);
        let mut params = predicate.params;
        if !predicate.sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.sql);
        }
        if !order.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }
        if let Some(limit) = options.limit {
            sql.push_str(" LIMIT ?");
            params.push(integer_param(limit, "limit")?);
            if let Some(offset) = options.offset {
                sql.push_str(" OFFSET ?");
                params.push(integer_param(offset, "offset")?);
            }
        }
        let rows = self.database.query_all(&sql, &params)?;
        let mut bound = Vec::with_capacity(rows.len());
        for row in rows {
            let entity = hydrate_collection::<T>(&meta, &row)?;
            let id = row.get(&meta.id.column).cloned().unwrap_or(SqlValue::Null);
            bound.push(Bound {
                entity,
                id,
                meta: Arc::clone(&meta),
                database: Arc::clone(&self.database),
            });
        }
        Ok(bound)
    }

    /// Counts rows matching `filter` without materializing them.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for misuse, predicate construction, or access
    /// failures.
    pub fn count<T: Persistable>(&self, filter: &Filter) -> Result<u64, StateError> {
        let meta = self.collection_context::<T>()?;
        let predicate = build_predicate(&meta, filter)?;
        let mut sql = format!("SELECT COUNT(*) AS row_count FROM {}", meta.table);
        if !predicate.sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicate.sql);
        }
        let row = self.database.query_one(&sql, &predicate.params)?;
        let count = match row.as_ref().and_then(|row| row.get("row_count")) {
            Some(SqlValue::Integer(count)) => u64::try_from(*count).unwrap_or(0),
            _ => 0,
        };
        Ok(count)
    }

    /// Inserts or replaces the row for `entity`'s id in one atomic
    /// statement.
    ///
    /// On conflict every field and `updated_at` update while `created_at`
    /// is preserved from the existing row.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for misuse, serialization, or execution
    /// failures.
    pub fn upsert<T: Persistable>(&self, entity: T) -> Result<Bound<T, D>, StateError> {
        let meta = self.collection_context::<T>()?;
        let id = serialize_id(&entity, &meta)?;
        let snapshot = snapshot_fields(&entity, &meta.fields)?;
        let mut columns = vec![meta.id.column.clone()];
        let mut markers = vec!["?".to_string()];
        let mut params = vec![id.clone()];
        let mut conflict_sets = Vec::with_capacity(snapshot.len() + 1);
        for (column, value) in snapshot {
            markers.push("?".to_string());
            params.push(value);
            conflict_sets.push(format!("{column} = excluded.{column}"));
            columns.push(column);
        }
        columns.push(CREATED_AT_COLUMN.to_string());
        markers.push(NOW_EXPR.to_string());
        columns.push(UPDATED_AT_COLUMN.to_string());
        markers.push(NOW_EXPR.to_string());
        conflict_sets.push(format!("{UPDATED_AT_COLUMN} = excluded.{UPDATED_AT_COLUMN}"));
        let upsert = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
            meta.table,
            columns.join(", "),
            markers.join(", "),
            meta.id.column,
            conflict_sets.join(", ")
        );
        self.database.execute(&upsert, &params)?;
        Ok(Bound {
            entity,
            id,
            meta,
            database: Arc::clone(&self.database),
        })
    }

    /// Bulk-updates rows matching `filter` and returns the affected count.
    ///
    /// An empty predicate is rejected to prevent accidental full-table
    /// updates. Unknown properties in `updates` are silently skipped;
    /// `updated_at` is always refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::EmptyUpdateFilter`] for an empty predicate,
    /// and misuse/serialization/access failures otherwise.
    pub fn update_where<T: Persistable>(
        &self,
        filter: &Filter,
        updates: &Updates,
    ) -> Result<u64, StateError> {
        let meta = self.collection_context::<T>()?;
        let predicate = build_predicate(&meta, filter)?;
        if predicate.sql.is_empty() {
            return Err(StateError::EmptyUpdateFilter);
        }
        let mut assignments = Vec::with_capacity(updates.entries().len() + 1);
        let mut params = Vec::with_capacity(updates.entries().len());
        for (property, value) in updates.entries() {
            let target = if *property == meta.id.property {
                Some((meta.id.column.as_str(), meta.id.field_type))
            } else {
                meta.fields
                    .iter()
                    .find(|field| field.property == *property)
                    .map(|field| (field.column.as_str(), field.field_type))
            };
            let Some((column, field_type)) = target else {
                continue;
            };
            assignments.push(format!("{column} = ?"));
            params.push(serialize(value, field_type)?);
        }
        assignments.push(format!("{UPDATED_AT_COLUMN} = {NOW_EXPR}"));
        params.extend(predicate.params);
        let update = format!(
            "UPDATE {} SET {} WHERE {}",
            meta.table,
            assignments.join(", "),
            predicate.sql
        );
        Ok(self.database.execute(&update, &params)?)
    }

    /// Bulk-deletes rows matching `filter` and returns the affected count.
    ///
    /// Unlike [`StateLoader::update_where`], an empty filter is permitted
    /// and deletes every row.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for misuse, predicate construction, or
    /// execution failures.
    pub fn delete_where<T: Persistable>(&self, filter: &Filter) -> Result<u64, StateError> {
        let meta = self.collection_context::<T>()?;
        let predicate = build_predicate(&meta, filter)?;
        let delete = if predicate.sql.is_empty() {
            format!("DELETE FROM {}", meta.table)
        } else {
            format!("DELETE FROM {} WHERE {}", meta.table, predicate.sql)
        };
        Ok(self.database.execute(&delete, &predicate.params)?)
    }

    /// Fetches a row by id, applies `mutate`, saves, and returns the bound
    /// entity.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotFound`] when no row exists for `id`, and
    /// misuse/serialization/access failures otherwise.
    pub fn modify<T: Persistable>(
        &self,
        id: impl Into<FieldValue>,
        mutate: impl FnOnce(&mut T),
    ) -> Result<Bound<T, D>, StateError> {
        let id_value = id.into();
        let rendered = id_value.to_string();
        let Some(mut bound) = self.get::<T>(id_value)? else {
            return Err(StateError::NotFound {
                type_name: short_type_name::<T>(),
                id: rendered,
            });
        };
        mutate(&mut *bound);
        bound.save()?;
        Ok(bound)
    }

    /// Runs `body` inside an immediate-mode transaction.
    ///
    /// Pending debounced saves are flushed first so no stale singleton
    /// write can enlist mid-transaction. Commits on `Ok`; rolls back and
    /// returns the body's original error value on `Err`. A nested call
    /// fails loudly with the engine's own error from the second begin.
    ///
    /// # Errors
    ///
    /// Returns the body's error unchanged after rollback, or [`StateError`]
    /// for flush/begin/commit failures.
    pub fn transaction<R>(
        &self,
        body: impl FnOnce() -> Result<R, StateError>,
    ) -> Result<R, StateError> {
        self.flush()?;
        self.database.begin_immediate()?;
        match body() {
            Ok(value) => {
                self.database.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.database.rollback();
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Resolves singleton metadata for `T`, raising the cross-API guard.
    fn resolve_state_meta<T: Persistable>(&self) -> Result<Arc<StateMeta>, StateError> {
        if let Some(meta) = self.registry.state_meta::<T>() {
            return Ok(meta);
        }
        if self.registry.is_collection::<T>() {
            return Err(StateError::IsCollection {
                type_name: short_type_name::<T>(),
            });
        }
        Err(StateError::NotRegistered {
            type_name: short_type_name::<T>(),
        })
    }

    /// Resolves collection metadata for `T` and runs the schema path.
    fn collection_context<T: Persistable>(&self) -> Result<Arc<CollectionMeta>, StateError> {
        let meta =
            self.registry.collection_meta::<T>().ok_or_else(|| StateError::NotCollection {
                type_name: short_type_name::<T>(),
            })?;
        ensure_collection_table(self.database.as_ref(), &meta)?;
        migrate_collection_additive(self.database.as_ref(), &meta)?;
        ensure_indices(self.database.as_ref(), &meta)?;
        Ok(meta)
    }
}

impl<D: Database + 'static> Drop for StateLoader<D> {
    fn drop(&mut self) {
        self.debounce.shutdown();
    }
}

// ============================================================================
// SECTION: Singleton Handle
// ============================================================================

/// Change-tracking wrapper over a loaded singleton instance.
///
/// # Invariants
/// - At most one debounced save per (table, key) is pending at any time;
///   rescheduling replaces the statement and resets the timer.
pub struct StateHandle<T: Persistable> {
    /// In-memory state instance.
    state: T,
    /// Caller-supplied row key.
    key: String,
    /// Singleton metadata.
    meta: Arc<StateMeta>,
    /// Debounce writer runtime handle.
    debounce: DebounceHandle,
}

impl<T: Persistable> fmt::Debug for StateHandle<T> {
    /// Formats the handle without requiring `T: Debug`, surfacing only the
    /// bound row key and singleton table name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandle")
            .field("key", &self.key)
            .field("table", &self.meta.table)
            .finish_non_exhaustive()
    }
}

impl<T: Persistable> StateHandle<T> {
    /// Returns the row key this handle is bound to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the wrapped state instance.
    #[must_use]
    pub fn state(&self) -> &T {
        &self.state
    }

    /// Applies a typed mutation and schedules a debounced save when a
    /// declared field changed.
    ///
    /// The full current row image is captured at schedule time, so a burst
    /// of updates within the quiet period collapses into one write carrying
    /// only the final values. Mutations touching no declared field never
    /// schedule.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when a declared field's new value cannot be
    /// serialized (for example NaN for a number field).
    pub fn update<R>(&mut self, mutate: impl FnOnce(&mut T) -> R) -> Result<R, StateError> {
        let before = snapshot_fields(&self.state, &self.meta.fields)?;
        let outcome = mutate(&mut self.state);
        let after = snapshot_fields(&self.state, &self.meta.fields)?;
        if before != after {
            self.schedule_save(after);
        }
        Ok(outcome)
    }

    /// Builds the full-row UPDATE and hands it to the debounce runtime.
    fn schedule_save(&self, snapshot: Vec<(String, SqlValue)>) {
        let mut assignments = Vec::with_capacity(snapshot.len() + 1);
        let mut params = Vec::with_capacity(snapshot.len() + 1);
        for (column, value) in snapshot {
            assignments.push(format!("{column} = ?"));
            params.push(value);
        }
        assignments.push(format!("{UPDATED_AT_COLUMN} = {NOW_EXPR}"));
        params.push(SqlValue::Text(self.key.clone()));
        let sql = format!(
            "UPDATE {} SET {} WHERE {KEY_COLUMN} = ?",
            self.meta.table,
            assignments.join(", ")
        );
        self.debounce.schedule(
            SaveKey {
                table: self.meta.table.clone(),
                key: self.key.clone(),
            },
            PendingStatement {
                sql,
                params,
            },
        );
    }
}

impl<T: Persistable> Deref for StateHandle<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

// ============================================================================
// SECTION: Bound Collection Entities
// ============================================================================

/// Collection entity bound to its row identity.
///
/// # Invariants
/// - `save`/`delete` close over the identity captured at bind time; an
///   in-memory mutation of the id field does not retarget them.
pub struct Bound<T: Persistable, D: Database + 'static> {
    /// In-memory entity instance.
    entity: T,
    /// Row identity captured at bind time.
    id: SqlValue,
    /// Collection metadata.
    meta: Arc<CollectionMeta>,
    /// Shared database handle.
    database: Arc<D>,
}

impl<T: Persistable, D: Database + 'static> fmt::Debug for Bound<T, D> {
    /// Formats the binding without requiring `T` or `D` to be `Debug`,
    /// surfacing only the row identity and collection table name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound")
            .field("id", &self.id)
            .field("table", &self.meta.table)
            .finish_non_exhaustive()
    }
}

impl<T: Persistable, D: Database + 'static> Bound<T, D> {
    /// Returns the bound row identity.
    #[must_use]
    pub fn id(&self) -> &SqlValue {
        &self.id
    }

    /// Consumes the binding and returns the entity.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.entity
    }

    /// Writes every declared field plus `updated_at` to the bound row.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] for serialization or execution failures.
    pub fn save(&self) -> Result<(), StateError> {
        let snapshot = snapshot_fields(&self.entity, &self.meta.fields)?;
        let mut assignments = Vec::with_capacity(snapshot.len() + 1);
        let mut params = Vec::with_capacity(snapshot.len() + 1);
        for (column, value) in snapshot {
            assignments.push(format!("{column} = ?"));
            params.push(value);
        }
        assignments.push(format!("{UPDATED_AT_COLUMN} = {NOW_EXPR}"));
        params.push(self.id.clone());
        let update = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.meta.table,
            assignments.join(", "),
            self.meta.id.column
        );
        self.database.execute(&update, &params)?;
        Ok(())
    }

    /// Deletes the bound row and consumes the binding.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the delete statement fails.
    pub fn delete(self) -> Result<(), StateError> {
        let delete =
            format!("DELETE FROM {} WHERE {} = ?", self.meta.table, self.meta.id.column);
        self.database.execute(&delete, &[self.id.clone()])?;
        Ok(())
    }
}

impl<T: Persistable, D: Database + 'static> Deref for Bound<T, D> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.entity
    }
}

impl<T: Persistable, D: Database + 'static> DerefMut for Bound<T, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entity
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Serializes every declared field of `entity` in declaration order.
fn snapshot_fields<T: Persistable>(
    entity: &T,
    fields: &[FieldMeta],
) -> Result<Vec<(String, SqlValue)>, StateError> {
    let mut snapshot = Vec::with_capacity(fields.len());
    for field in fields {
        let value = entity.read_field(&field.property).unwrap_or(FieldValue::Null);
        snapshot.push((field.column.clone(), serialize(&value, field.field_type)?));
    }
    Ok(snapshot)
}

/// Serializes the id field of `entity`, rejecting NULL ids.
fn serialize_id<T: Persistable>(
    entity: &T,
    meta: &CollectionMeta,
) -> Result<SqlValue, StateError> {
    let value = entity.read_field(&meta.id.property).unwrap_or(FieldValue::Null);
    let id = serialize(&value, meta.id.field_type)?;
    if id.is_null() {
        return Err(StateError::NullId {
            type_name: short_type_name::<T>(),
        });
    }
    Ok(id)
}

/// Hydrates a fresh entity from a fetched row, writing NULLs through.
fn hydrate_collection<T: Persistable>(
    meta: &CollectionMeta,
    row: &SqlRow,
) -> Result<T, StateError> {
    let mut entity = T::fresh();
    if let Some(value) = row.get(&meta.id.column) {
        let hydrated = deserialize(value, meta.id.field_type)?;
        let _ = entity.write_field(&meta.id.property, hydrated);
    }
    for field in &meta.fields {
        let Some(value) = row.get(&field.column) else {
            continue;
        };
        let hydrated = deserialize(value, field.field_type)?;
        let _ = entity.write_field(&field.property, hydrated);
    }
    Ok(entity)
}

/// Converts a caller-supplied row bound into an integer bind value.
fn integer_param(value: u64, label: &str) -> Result<SqlValue, StateError> {
    let converted = i64::try_from(value)
        .map_err(|_| DbError::Invalid(format!("{label} value out of range: {value}")))?;
    Ok(SqlValue::Integer(converted))
}
