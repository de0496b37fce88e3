// crates/statehouse-core/src/meta.rs
// ============================================================================
// Module: Persistence Metadata Registry
// Description: Class tokens, field/table metadata, and two-phase registration.
// Purpose: Associate Rust type identities with immutable persistence metadata
//          and enforce registration invariants eagerly.
// Dependencies: convert_case, thiserror
// ============================================================================

//! ## Overview
//! Persisted types are described by metadata installed through a two-phase
//! registration protocol: a per-type accumulator ([`StateRegistration`] or
//! [`CollectionRegistration`]) stages field, id, and index declarations, and
//! a single [`StateRegistry`] call consumes the accumulator, validates the
//! registration invariants, and installs immutable metadata keyed by the
//! type's [`ClassToken`].
//!
//! Invariants enforced here, at registration time:
//! - a persisted state type must not extend another persisted state type;
//! - a persisted collection type must not extend another persisted
//!   collection type;
//! - a collection type declares exactly one id field;
//! - index declarations reference known properties only.
//!
//! Column names default to the snake_case form of the property name unless
//! explicitly overridden; collisions are the caller's responsibility.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::TypeId;
use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use convert_case::Case;
use convert_case::Casing;
use thiserror::Error;

use crate::value::FieldType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Primary key column of every singleton state table.
pub const KEY_COLUMN: &str = "key";
/// Insert-once timestamp column of every collection table.
pub const CREATED_AT_COLUMN: &str = "created_at";
/// Refreshed-on-write timestamp column of every persisted table.
pub const UPDATED_AT_COLUMN: &str = "updated_at";
/// Default column name for a collection id field.
pub const DEFAULT_ID_COLUMN: &str = "id";

// ============================================================================
// SECTION: Class Tokens
// ============================================================================

/// Stable identity of a persisted Rust type.
///
/// # Invariants
/// - Two tokens compare equal iff they name the same Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassToken {
    /// Runtime type identity.
    type_id: TypeId,
    /// Short type name (module path stripped) for diagnostics.
    name: &'static str,
}

impl ClassToken {
    /// Returns the token for type `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
        }
    }

    /// Returns the runtime type identity.
    #[must_use]
    pub const fn type_id(self) -> TypeId {
        self.type_id
    }

    /// Returns the short type name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.name
    }
}

/// Returns the type name of `T` with its module path stripped.
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

// ============================================================================
// SECTION: Field Metadata
// ============================================================================

/// Metadata for one persisted property.
///
/// # Invariants
/// - `column` is fixed at registration time (snake_case of `property`
///   unless overridden) and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    /// Logical property name used by callers and filters.
    pub property: String,
    /// Physical storage column name.
    pub column: String,
    /// Declared field type.
    pub field_type: FieldType,
}

/// Metadata for one declared index: resolved columns in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Ordered physical column names.
    pub columns: Vec<String>,
}

impl IndexMeta {
    /// Returns the deterministic index name for `table`.
    #[must_use]
    pub fn index_name(&self, table: &str) -> String {
        format!("{table}_idx_{}", self.columns.join("_"))
    }
}

/// Metadata for a singleton-persisted state type.
///
/// # Invariants
/// - Field order is declaration order; immutable after installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMeta {
    /// Physical table name.
    pub table: String,
    /// Ordered persisted fields.
    pub fields: Vec<FieldMeta>,
}

impl StateMeta {
    /// Returns the field metadata for `property`, if declared.
    #[must_use]
    pub fn field(&self, property: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|field| field.property == property)
    }
}

/// Metadata for a collection-persisted type.
///
/// # Invariants
/// - Exactly one id field; field order is declaration order; immutable
///   after installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMeta {
    /// Physical table name.
    pub table: String,
    /// The id field (primary key).
    pub id: FieldMeta,
    /// Ordered non-id persisted fields.
    pub fields: Vec<FieldMeta>,
    /// Declared indices.
    pub indices: Vec<IndexMeta>,
}

impl CollectionMeta {
    /// Resolves a logical property to its column and type.
    ///
    /// Covers the id field, every declared field, and the two automatic
    /// timestamp columns.
    #[must_use]
    pub fn resolve(&self, property: &str) -> Option<(&str, FieldType)> {
        if property == self.id.property {
            return Some((self.id.column.as_str(), self.id.field_type));
        }
        if let Some(field) = self.fields.iter().find(|field| field.property == property) {
            return Some((field.column.as_str(), field.field_type));
        }
        if property == CREATED_AT_COLUMN {
            return Some((CREATED_AT_COLUMN, FieldType::Date));
        }
        if property == UPDATED_AT_COLUMN {
            return Some((UPDATED_AT_COLUMN, FieldType::Date));
        }
        None
    }

    /// Returns every property name filters and order terms may reference.
    #[must_use]
    pub fn known_properties(&self) -> Vec<String> {
        let mut known = Vec::with_capacity(self.fields.len() + 3);
        known.push(self.id.property.clone());
        for field in &self.fields {
            known.push(field.property.clone());
        }
        known.push(CREATED_AT_COLUMN.to_string());
        known.push(UPDATED_AT_COLUMN.to_string());
        known
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registration-time errors; all are fatal programmer errors.
///
/// # Invariants
/// - Messages name the offending type (and ancestor table where relevant).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A persisted state type declared a persisted state ancestor.
    #[error(
        "persisted state type `{type_name}` must not extend persisted state type backed by table \
         `{ancestor_table}`"
    )]
    StateInheritance {
        /// Offending subtype name.
        type_name: &'static str,
        /// Table of the persisted ancestor.
        ancestor_table: String,
    },
    /// A persisted collection type declared a persisted collection ancestor.
    #[error(
        "persisted collection type `{type_name}` must not extend persisted collection type \
         backed by table `{ancestor_table}`"
    )]
    CollectionInheritance {
        /// Offending subtype name.
        type_name: &'static str,
        /// Table of the persisted ancestor.
        ancestor_table: String,
    },
    /// A collection registration staged no id field.
    #[error("persisted collection type `{type_name}` must declare exactly one id field")]
    MissingId {
        /// Offending type name.
        type_name: &'static str,
    },
    /// A collection registration staged more than one id field.
    #[error("multiple id fields declared for persisted collection type `{type_name}`")]
    MultipleIds {
        /// Offending type name.
        type_name: &'static str,
    },
    /// An index declaration referenced an unknown property.
    #[error("index on `{type_name}` references unknown property `{property}`")]
    UnknownIndexProperty {
        /// Offending type name.
        type_name: &'static str,
        /// Unknown property referenced by the index.
        property: String,
    },
    /// The type was registered twice.
    #[error("type `{type_name}` is already registered")]
    AlreadyRegistered {
        /// Offending type name.
        type_name: &'static str,
    },
    /// The registry lock was poisoned by a panicking writer.
    #[error("state registry lock poisoned")]
    Poisoned,
}

// ============================================================================
// SECTION: Registration Accumulators
// ============================================================================

/// Staged declaration of one persisted field.
#[derive(Debug, Clone)]
struct PendingField {
    /// Logical property name.
    property: String,
    /// Optional explicit column override.
    column: Option<String>,
    /// Declared field type.
    field_type: FieldType,
}

impl PendingField {
    /// Resolves the staged declaration into final field metadata.
    fn into_meta(self) -> FieldMeta {
        let column =
            self.column.unwrap_or_else(|| self.property.as_str().to_case(Case::Snake));
        FieldMeta {
            property: self.property,
            column,
            field_type: self.field_type,
        }
    }
}

/// Phase-one accumulator for a singleton state registration.
///
/// # Invariants
/// - Consumed exactly once by [`StateRegistry::register_state`].
#[derive(Debug, Clone)]
pub struct StateRegistration {
    /// Target table name.
    table: String,
    /// Declared supertype, if any.
    parent: Option<ClassToken>,
    /// Staged field declarations in order.
    fields: Vec<PendingField>,
}

impl StateRegistration {
    /// Starts a registration targeting `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            parent: None,
            fields: Vec::new(),
        }
    }

    /// Declares a supertype relationship for the inheritance check.
    #[must_use]
    pub fn extends(mut self, parent: ClassToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Stages a persisted field with a derived column name.
    #[must_use]
    pub fn field(self, property: impl Into<String>, field_type: FieldType) -> Self {
        self.stage(property.into(), None, field_type)
    }

    /// Stages a persisted field with an explicit column name.
    #[must_use]
    pub fn field_with_column(
        self,
        property: impl Into<String>,
        column: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        self.stage(property.into(), Some(column.into()), field_type)
    }

    /// Appends one staged field declaration.
    fn stage(mut self, property: String, column: Option<String>, field_type: FieldType) -> Self {
        self.fields.push(PendingField {
            property,
            column,
            field_type,
        });
        self
    }
}

/// Phase-one accumulator for a collection registration.
///
/// # Invariants
/// - Consumed exactly once by [`StateRegistry::register_collection`].
#[derive(Debug, Clone)]
pub struct CollectionRegistration {
    /// Target table name.
    table: String,
    /// Declared supertype, if any.
    parent: Option<ClassToken>,
    /// Staged id declarations; exactly one must remain at phase two.
    ids: Vec<PendingField>,
    /// Staged non-id field declarations in order.
    fields: Vec<PendingField>,
    /// Staged index declarations as property lists.
    indices: Vec<Vec<String>>,
}

impl CollectionRegistration {
    /// Starts a registration targeting `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            parent: None,
            ids: Vec::new(),
            fields: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Declares a supertype relationship for the inheritance check.
    #[must_use]
    pub fn extends(mut self, parent: ClassToken) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Stages the id field with the default `id` column name.
    #[must_use]
    pub fn id(mut self, property: impl Into<String>, field_type: FieldType) -> Self {
        self.ids.push(PendingField {
            property: property.into(),
            column: Some(DEFAULT_ID_COLUMN.to_string()),
            field_type,
        });
        self
    }

    /// Stages the id field with an explicit column name.
    #[must_use]
    pub fn id_with_column(
        mut self,
        property: impl Into<String>,
        column: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        self.ids.push(PendingField {
            property: property.into(),
            column: Some(column.into()),
            field_type,
        });
        self
    }

    /// Stages a persisted field with a derived column name.
    #[must_use]
    pub fn field(self, property: impl Into<String>, field_type: FieldType) -> Self {
        self.stage(property.into(), None, field_type)
    }

    /// Stages a persisted field with an explicit column name.
    #[must_use]
    pub fn field_with_column(
        self,
        property: impl Into<String>,
        column: impl Into<String>,
        field_type: FieldType,
    ) -> Self {
        self.stage(property.into(), Some(column.into()), field_type)
    }

    /// Stages an index over the listed properties, in order.
    #[must_use]
    pub fn index(mut self, properties: &[&str]) -> Self {
        self.indices.push(properties.iter().map(ToString::to_string).collect());
        self
    }

    /// Appends one staged field declaration.
    fn stage(mut self, property: String, column: Option<String>, field_type: FieldType) -> Self {
        self.fields.push(PendingField {
            property,
            column,
            field_type,
        });
        self
    }
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Installed metadata for one registered type.
#[derive(Debug, Clone)]
struct RegisteredClass {
    /// Declared supertype, if any, for ancestor walks.
    parent: Option<ClassToken>,
    /// Installed persistence metadata.
    meta: ClassMetadata,
}

/// Metadata variants by persistence pattern.
#[derive(Debug, Clone)]
enum ClassMetadata {
    /// Singleton keyed-state pattern.
    State(Arc<StateMeta>),
    /// Multi-row collection pattern.
    Collection(Arc<CollectionMeta>),
}

/// Process-lifetime registry from type identity to persistence metadata.
///
/// # Invariants
/// - Metadata is immutable once installed.
/// - The registry is shared (`Arc`) between loaders; registration is
///   expected at startup, before loaders are exercised.
#[derive(Debug, Default)]
pub struct StateRegistry {
    /// Installed registrations keyed by type identity.
    classes: RwLock<HashMap<TypeId, RegisteredClass>>,
}

impl StateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a state accumulator and installs singleton metadata for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when `T` is already registered or when
    /// a declared ancestor is itself a persisted state type.
    pub fn register_state<T: 'static>(
        &self,
        registration: StateRegistration,
    ) -> Result<(), RegistrationError> {
        let token = ClassToken::of::<T>();
        let mut classes = self.classes.write().map_err(|_| RegistrationError::Poisoned)?;
        if classes.contains_key(&token.type_id()) {
            return Err(RegistrationError::AlreadyRegistered {
                type_name: token.name(),
            });
        }
        if let Some(ancestor_table) =
            persisted_ancestor_table(&classes, registration.parent, Pattern::State)
        {
            return Err(RegistrationError::StateInheritance {
                type_name: token.name(),
                ancestor_table,
            });
        }
        let meta = StateMeta {
            table: registration.table,
            fields: registration.fields.into_iter().map(PendingField::into_meta).collect(),
        };
        classes.insert(token.type_id(), RegisteredClass {
            parent: registration.parent,
            meta: ClassMetadata::State(Arc::new(meta)),
        });
        Ok(())
    }

    /// Consumes a collection accumulator and installs collection metadata
    /// for `T`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when `T` is already registered, when
    /// the id declaration count is not exactly one, when an index references
    /// an unknown property, or when a declared ancestor is itself a
    /// persisted collection type.
    pub fn register_collection<T: 'static>(
        &self,
        registration: CollectionRegistration,
    ) -> Result<(), RegistrationError> {
        let token = ClassToken::of::<T>();
        let mut classes = self.classes.write().map_err(|_| RegistrationError::Poisoned)?;
        if classes.contains_key(&token.type_id()) {
            return Err(RegistrationError::AlreadyRegistered {
                type_name: token.name(),
            });
        }
        if let Some(ancestor_table) =
            persisted_ancestor_table(&classes, registration.parent, Pattern::Collection)
        {
            return Err(RegistrationError::CollectionInheritance {
                type_name: token.name(),
                ancestor_table,
            });
        }
        let mut ids = registration.ids;
        if ids.is_empty() {
            return Err(RegistrationError::MissingId {
                type_name: token.name(),
            });
        }
        if ids.len() > 1 {
            return Err(RegistrationError::MultipleIds {
                type_name: token.name(),
            });
        }
        let id = ids.remove(0).into_meta();
        let fields: Vec<FieldMeta> =
            registration.fields.into_iter().map(PendingField::into_meta).collect();
        let mut indices = Vec::with_capacity(registration.indices.len());
        for properties in registration.indices {
            let mut columns = Vec::with_capacity(properties.len());
            for property in properties {
                let column = if property == id.property {
                    id.column.clone()
                } else if let Some(field) =
                    fields.iter().find(|field| field.property == property)
                {
                    field.column.clone()
                } else if property == CREATED_AT_COLUMN || property == UPDATED_AT_COLUMN {
                    property.clone()
                } else {
                    return Err(RegistrationError::UnknownIndexProperty {
                        type_name: token.name(),
                        property,
                    });
                };
                columns.push(column);
            }
            indices.push(IndexMeta {
                columns,
            });
        }
        let meta = CollectionMeta {
            table: registration.table,
            id,
            fields,
            indices,
        };
        classes.insert(token.type_id(), RegisteredClass {
            parent: registration.parent,
            meta: ClassMetadata::Collection(Arc::new(meta)),
        });
        Ok(())
    }

    /// Returns the singleton metadata installed for `T`, if any.
    #[must_use]
    pub fn state_meta<T: 'static>(&self) -> Option<Arc<StateMeta>> {
        let classes = self.classes.read().ok()?;
        match classes.get(&TypeId::of::<T>()) {
            Some(RegisteredClass {
                meta: ClassMetadata::State(meta),
                ..
            }) => Some(Arc::clone(meta)),
            _ => None,
        }
    }

    /// Returns the collection metadata installed for `T`, if any.
    #[must_use]
    pub fn collection_meta<T: 'static>(&self) -> Option<Arc<CollectionMeta>> {
        let classes = self.classes.read().ok()?;
        match classes.get(&TypeId::of::<T>()) {
            Some(RegisteredClass {
                meta: ClassMetadata::Collection(meta),
                ..
            }) => Some(Arc::clone(meta)),
            _ => None,
        }
    }

    /// Returns true when `T` is registered under the collection pattern.
    #[must_use]
    pub fn is_collection<T: 'static>(&self) -> bool {
        self.collection_meta::<T>().is_some()
    }

    /// Returns true when `T` is registered under either pattern.
    #[must_use]
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.classes
            .read()
            .map(|classes| classes.contains_key(&TypeId::of::<T>()))
            .unwrap_or(false)
    }
}

/// Persistence pattern discriminant used by the ancestor walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pattern {
    /// Singleton keyed-state pattern.
    State,
    /// Multi-row collection pattern.
    Collection,
}

/// Walks the declared ancestor chain and returns the table of the first
/// ancestor registered under `pattern`, if any.
fn persisted_ancestor_table(
    classes: &HashMap<TypeId, RegisteredClass>,
    mut ancestor: Option<ClassToken>,
    pattern: Pattern,
) -> Option<String> {
    while let Some(token) = ancestor {
        let Some(registered) = classes.get(&token.type_id()) else {
            return None;
        };
        match (&registered.meta, pattern) {
            (ClassMetadata::State(meta), Pattern::State) => return Some(meta.table.clone()),
            (ClassMetadata::Collection(meta), Pattern::Collection) => {
                return Some(meta.table.clone());
            }
            _ => {}
        }
        ancestor = registered.parent;
    }
    None
}
