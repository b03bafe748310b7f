//! Store orchestrator: read, merge-update, assert and retract facts.
//!
//! # Responsibility
//! - Resolve an entity's datoms into typed values.
//! - Merge partial updates against the store's schema.
//! - Expose the raw assert/retract primitives.
//!
//! # Invariants
//! - `update` validates and coerces every entry before the first write, so an
//!   undefined attribute or type mismatch never leaves partial effects.
//! - Within one `update`, all retractions are applied before any assertion.
//!
//! # Transactions
//! The store never opens a transaction. A persistence failure between two
//! writes of one `update` can leave the earlier writes applied. Callers that
//! need all-or-nothing behavior build the store on a `rusqlite::Transaction`
//! and commit after the call returns.
//!
//! Concurrent `update` calls on the same entity from different connections
//! race read-then-write: the last write wins per attribute and the merged map
//! returned by either call may be stale.

use crate::model::attribute::{Attribute, StoreId};
use crate::model::datatype::{CoercionError, DataType, RawValue, Value};
use crate::model::datom::Datom;
use crate::model::entity::EntityId;
use crate::repo::datom_repo::{DatomRepository, SqliteDatomRepository};
use crate::repo::schema_repo::{SchemaRepository, SqliteSchemaRepository};
use crate::repo::RepoError;
use crate::service::schema_service::SchemaRegistry;
use log::{debug, info, warn};
use rusqlite::Connection;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type StoreResult<T> = Result<T, StoreError>;

/// Current fact set of one entity: attribute name to typed value.
pub type Attributes = BTreeMap<String, Value>;

/// Domain error for schema and store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Value does not fit the attribute's datatype.
    TypeMismatch {
        attribute: String,
        offered: &'static str,
        expected: DataType,
    },
    /// Update references a name absent from the store's schema.
    UndefinedAttribute(String),
    /// Attribute already exists with another datatype.
    SchemaConflict {
        name: String,
        existing: DataType,
        requested: DataType,
    },
    InvalidAttributeName(String),
    /// Persistence failure, passed through unmodified.
    Repo(RepoError),
}

impl StoreError {
    fn type_mismatch(attribute: &str, err: CoercionError) -> Self {
        Self::TypeMismatch {
            attribute: attribute.to_string(),
            offered: err.offered,
            expected: err.expected,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UndefinedAttribute(_) => "undefined_attribute",
            Self::SchemaConflict { .. } => "schema_conflict",
            Self::InvalidAttributeName(_) => "invalid_attribute_name",
            Self::Repo(_) => "persistence",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TypeMismatch {
                attribute,
                offered,
                expected,
            } => write!(
                f,
                "cannot assign {offered} to {expected} attribute \"{attribute}\""
            ),
            Self::UndefinedAttribute(name) => write!(f, "attribute \"{name}\" is not defined"),
            Self::SchemaConflict {
                name,
                existing,
                requested,
            } => write!(
                f,
                "cannot change datatype of \"{name}\" attribute from {existing} to {requested}"
            ),
            Self::InvalidAttributeName(name) => write!(f, "invalid attribute name: `{name}`"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Partial update input: `Some(value)` sets an attribute, `None` removes it.
///
/// Keys are unique and iterate in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    entries: BTreeMap<String, Option<RawValue>>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `name = value`, replacing any earlier entry for `name`.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.entries.insert(name.into(), Some(value.into()));
        self
    }

    /// Stages removal of `name`, replacing any earlier entry for `name`.
    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.entries.insert(name.into(), None);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, Option<RawValue>>> for Changes {
    fn from(entries: BTreeMap<String, Option<RawValue>>) -> Self {
        Self { entries }
    }
}

impl FromIterator<(String, Option<RawValue>)> for Changes {
    fn from_iter<I: IntoIterator<Item = (String, Option<RawValue>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Changes {
    type Item = (String, Option<RawValue>);
    type IntoIter = btree_map::IntoIter<String, Option<RawValue>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Store-scoped EAV orchestrator over schema and datom repositories.
pub struct Store<S: SchemaRepository, D: DatomRepository> {
    registry: SchemaRegistry<S>,
    datoms: D,
}

/// Store backed by the SQLite repositories of one connection.
pub type SqliteStore<'conn> = Store<SqliteSchemaRepository<'conn>, SqliteDatomRepository<'conn>>;

impl<'conn> SqliteStore<'conn> {
    /// Builds a store over a migrated connection (or transaction).
    pub fn try_new(conn: &'conn Connection, store_id: StoreId) -> StoreResult<Self> {
        Ok(Store::new(
            store_id,
            SqliteSchemaRepository::try_new(conn)?,
            SqliteDatomRepository::try_new(conn)?,
        ))
    }
}

impl<S: SchemaRepository, D: DatomRepository> Store<S, D> {
    pub fn new(store_id: StoreId, schema_repo: S, datom_repo: D) -> Self {
        Self {
            registry: SchemaRegistry::new(store_id, schema_repo),
            datoms: datom_repo,
        }
    }

    pub fn store_id(&self) -> StoreId {
        self.registry.store_id()
    }

    pub fn registry(&self) -> &SchemaRegistry<S> {
        &self.registry
    }

    /// See [`SchemaRegistry::schema`].
    pub fn schema(&self) -> StoreResult<BTreeMap<String, Attribute>> {
        self.registry.schema()
    }

    /// See [`SchemaRegistry::define_attribute`].
    pub fn define_attribute(&self, name: &str, data_type: DataType) -> StoreResult<Attribute> {
        self.registry.define_attribute(name, data_type)
    }

    /// See [`SchemaRegistry::forget_attribute`].
    pub fn forget_attribute(&self, name: &str) -> StoreResult<()> {
        self.registry.forget_attribute(name)
    }

    /// Returns every current fact of `entity`. Unknown entities yield an empty map.
    pub fn attributes(&self, entity: impl Into<EntityId>) -> StoreResult<Attributes> {
        let entity = entity.into();
        let datoms = self.datoms.read_datoms(self.store_id(), &entity)?;
        Ok(datoms
            .into_iter()
            .map(|datom| (datom.attribute, datom.value))
            .collect())
    }

    /// Merges `changes` into the facts of `entity` and returns the merged set.
    ///
    /// # Contract
    /// - Unknown names fail with `UndefinedAttribute`.
    /// - `None` removes the attribute; removing one the entity lacks is a no-op.
    /// - Values are coerced to the attribute datatype; failures yield
    ///   `TypeMismatch` naming the attribute.
    /// - Nothing is written unless every entry validates.
    pub fn update(
        &self,
        entity: impl Into<EntityId>,
        changes: impl Into<Changes>,
    ) -> StoreResult<Attributes> {
        let entity = entity.into();
        let started_at = Instant::now();

        match self.stage_and_apply(&entity, changes.into()) {
            Ok((merged, retracted, asserted)) => {
                debug!(
                    "event=entity_update module=store status=ok store_id={} retractions={} assertions={} duration_ms={}",
                    self.store_id(),
                    retracted,
                    asserted,
                    started_at.elapsed().as_millis()
                );
                Ok(merged)
            }
            Err(err) => {
                warn!(
                    "event=entity_update module=store status=error store_id={} error_code={} duration_ms={} error={}",
                    self.store_id(),
                    err.code(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    fn stage_and_apply(
        &self,
        entity: &EntityId,
        changes: Changes,
    ) -> StoreResult<(Attributes, usize, usize)> {
        let schema = self.registry.schema()?;
        let mut held: BTreeMap<String, Datom> = self
            .datoms
            .read_datoms(self.store_id(), entity)?
            .into_iter()
            .map(|datom| (datom.attribute.clone(), datom))
            .collect();
        let mut merged: Attributes = held
            .iter()
            .map(|(name, datom)| (name.clone(), datom.value.clone()))
            .collect();

        let mut retractions = Vec::new();
        let mut assertions = Vec::new();

        for (name, change) in changes {
            let attribute = schema
                .get(&name)
                .ok_or_else(|| StoreError::UndefinedAttribute(name.clone()))?;

            match change {
                None => {
                    if let Some(existing) = held.remove(&name) {
                        retractions.push(existing);
                    }
                    merged.remove(&name);
                }
                Some(raw) => {
                    let datom = attribute
                        .datom(entity.clone(), raw)
                        .map_err(|err| StoreError::type_mismatch(&name, err))?;
                    merged.insert(name, datom.value.clone());
                    assertions.push(datom);
                }
            }
        }

        self.retract(&retractions)?;
        self.assert(&assertions)?;

        Ok((merged, retractions.len(), assertions.len()))
    }

    /// Upserts each datom by `(store, entity, attribute)` without schema checks.
    ///
    /// A datom for an attribute missing from the schema fails with the
    /// persistence layer's foreign key error.
    pub fn assert(&self, datoms: &[Datom]) -> StoreResult<()> {
        Ok(self.datoms.assert_datoms(self.store_id(), datoms)?)
    }

    /// Deletes each datom's row; rows that do not exist are skipped.
    pub fn retract(&self, datoms: &[Datom]) -> StoreResult<()> {
        Ok(self.datoms.retract_datoms(self.store_id(), datoms)?)
    }

    /// Retracts every current fact of `entity`. Schema and other entities are
    /// untouched.
    pub fn forget_entity(&self, entity: impl Into<EntityId>) -> StoreResult<()> {
        let entity = entity.into();
        let datoms = self.datoms.read_datoms(self.store_id(), &entity)?;
        self.retract(&datoms)?;
        info!(
            "event=entity_forget module=store status=ok store_id={} retractions={}",
            self.store_id(),
            datoms.len()
        );
        Ok(())
    }
}
