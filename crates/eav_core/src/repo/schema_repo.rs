//! Attribute definition storage (`eav_schema`).
//!
//! # Responsibility
//! - List, look up, insert-if-absent and delete attribute definitions.
//!
//! # Invariants
//! - Inserts never overwrite an existing definition's datatype.
//! - Deleting a definition cascades to its datoms through the foreign key.

use crate::model::attribute::{Attribute, StoreId};
use crate::model::datatype::DataType;
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Storage contract for store-scoped attribute definitions.
pub trait SchemaRepository {
    /// Returns every attribute defined in `store_id`, ordered by name.
    fn list_attributes(&self, store_id: StoreId) -> RepoResult<Vec<Attribute>>;
    /// Loads one attribute definition.
    fn get_attribute(&self, store_id: StoreId, name: &str) -> RepoResult<Option<Attribute>>;
    /// Inserts `(store_id, name, data_type)` unless `name` already exists, then
    /// returns the definition as stored (which may carry another datatype).
    fn insert_attribute_if_absent(
        &self,
        store_id: StoreId,
        name: &str,
        data_type: DataType,
    ) -> RepoResult<Attribute>;
    /// Deletes one definition and, by cascade, its datoms. Returns whether a
    /// row was removed.
    fn delete_attribute(&self, store_id: StoreId, name: &str) -> RepoResult<bool>;
}

/// SQLite-backed schema repository.
pub struct SqliteSchemaRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSchemaRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SchemaRepository for SqliteSchemaRepository<'_> {
    fn list_attributes(&self, store_id: StoreId) -> RepoResult<Vec<Attribute>> {
        let mut stmt = self.conn.prepare(
            "SELECT store_id, name, datatype
             FROM eav_schema
             WHERE store_id = ?1
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([store_id])?;
        let mut attributes = Vec::new();
        while let Some(row) = rows.next()? {
            attributes.push(parse_attribute_row(row)?);
        }
        Ok(attributes)
    }

    fn get_attribute(&self, store_id: StoreId, name: &str) -> RepoResult<Option<Attribute>> {
        let raw = self
            .conn
            .query_row(
                "SELECT store_id, name, datatype
                 FROM eav_schema
                 WHERE store_id = ?1 AND name = ?2;",
                params![store_id, name],
                |row| {
                    Ok((
                        row.get::<_, StoreId>("store_id")?,
                        row.get::<_, String>("name")?,
                        row.get::<_, i64>("datatype")?,
                    ))
                },
            )
            .optional()?;

        raw.map(|(store_id, name, code)| attribute_from_parts(store_id, name, code))
            .transpose()
    }

    fn insert_attribute_if_absent(
        &self,
        store_id: StoreId,
        name: &str,
        data_type: DataType,
    ) -> RepoResult<Attribute> {
        self.conn.execute(
            "INSERT INTO eav_schema (store_id, name, datatype)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (store_id, name) DO NOTHING;",
            params![store_id, name, data_type.code()],
        )?;

        self.get_attribute(store_id, name)?.ok_or_else(|| {
            RepoError::InvalidData(format!(
                "attribute `{name}` missing in store {store_id} after insert"
            ))
        })
    }

    fn delete_attribute(&self, store_id: StoreId, name: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM eav_schema WHERE store_id = ?1 AND name = ?2;",
            params![store_id, name],
        )?;
        Ok(changed > 0)
    }
}

fn parse_attribute_row(row: &Row<'_>) -> RepoResult<Attribute> {
    attribute_from_parts(row.get("store_id")?, row.get("name")?, row.get("datatype")?)
}

fn attribute_from_parts(store_id: StoreId, name: String, code: i64) -> RepoResult<Attribute> {
    let data_type = DataType::from_code(code).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid datatype code `{code}` for attribute `{name}` in eav_schema.datatype"
        ))
    })?;
    Ok(Attribute::new(store_id, name, data_type))
}
