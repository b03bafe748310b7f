//! Schema registry use-cases.
//!
//! # Responsibility
//! - Define attributes idempotently and reject datatype redefinition.
//! - Forget attributes (and, by cascade, their datoms) within one store.
//!
//! # Invariants
//! - A conflicting `define_attribute` never mutates the stored definition.
//! - Every call is scoped to the registry's `store_id`.

use crate::model::attribute::{Attribute, StoreId};
use crate::model::datatype::DataType;
use crate::repo::schema_repo::SchemaRepository;
use crate::service::store_service::{StoreError, StoreResult};
use log::{info, warn};
use std::collections::BTreeMap;

/// Store-scoped attribute registry over a schema repository.
pub struct SchemaRegistry<R: SchemaRepository> {
    store_id: StoreId,
    repo: R,
}

impl<R: SchemaRepository> SchemaRegistry<R> {
    pub fn new(store_id: StoreId, repo: R) -> Self {
        Self { store_id, repo }
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    /// Returns every attribute currently defined in this store, keyed by name.
    pub fn schema(&self) -> StoreResult<BTreeMap<String, Attribute>> {
        let attributes = self.repo.list_attributes(self.store_id)?;
        Ok(attributes
            .into_iter()
            .map(|attribute| (attribute.name.clone(), attribute))
            .collect())
    }

    /// Looks up one attribute definition.
    pub fn attribute(&self, name: &str) -> StoreResult<Option<Attribute>> {
        Ok(self.repo.get_attribute(self.store_id, name)?)
    }

    /// Creates `name` with `data_type`, or verifies an existing definition.
    ///
    /// # Contract
    /// - Absent: created and returned.
    /// - Present with the same datatype: returned unchanged.
    /// - Present with another datatype: `SchemaConflict`, definition untouched.
    pub fn define_attribute(&self, name: &str, data_type: DataType) -> StoreResult<Attribute> {
        validate_name(name)?;

        let stored = self
            .repo
            .insert_attribute_if_absent(self.store_id, name, data_type)?;

        if stored.data_type != data_type {
            warn!(
                "event=attribute_define module=schema status=error store_id={} attribute={} error_code=schema_conflict existing={} requested={}",
                self.store_id, name, stored.data_type, data_type
            );
            return Err(StoreError::SchemaConflict {
                name: name.to_string(),
                existing: stored.data_type,
                requested: data_type,
            });
        }

        info!(
            "event=attribute_define module=schema status=ok store_id={} attribute={} datatype={}",
            self.store_id, name, data_type
        );
        Ok(stored)
    }

    /// Removes `name` and every datom in this store that references it.
    ///
    /// Forgetting an attribute that does not exist is not an error.
    pub fn forget_attribute(&self, name: &str) -> StoreResult<()> {
        let removed = self.repo.delete_attribute(self.store_id, name)?;
        info!(
            "event=attribute_forget module=schema status=ok store_id={} attribute={} removed={}",
            self.store_id, name, removed
        );
        Ok(())
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidAttributeName(name.to_string()));
    }
    Ok(())
}
