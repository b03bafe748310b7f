//! Datom storage (`eav_datoms`).
//!
//! # Responsibility
//! - Read every current datom of one entity, decoded through its attribute.
//! - Upsert (assert) and delete (retract) datoms by
//!   `(store_id, entity_id, attribute_name)`.
//!
//! # Invariants
//! - Assert/retract statements are prepared on first use and then reused
//!   for the repository's lifetime.
//! - A stored row whose datatype code is unknown, or whose value column for
//!   that datatype is NULL, is reported as `InvalidData`.

use crate::model::attribute::StoreId;
use crate::model::datatype::{DataType, Value};
use crate::model::datom::Datom;
use crate::model::entity::EntityId;
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use chrono::{DateTime, Utc};
use once_cell::unsync::OnceCell;
use rusqlite::{params, Connection, Row, Statement};
use std::cell::RefCell;

const ASSERT_SQL: &str = "INSERT INTO eav_datoms (
        store_id,
        entity_id,
        attribute_name,
        stringval,
        numberval,
        booleanval,
        timeval
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT (store_id, entity_id, attribute_name) DO UPDATE SET
        stringval = excluded.stringval,
        numberval = excluded.numberval,
        booleanval = excluded.booleanval,
        timeval = excluded.timeval;";

const RETRACT_SQL: &str = "DELETE FROM eav_datoms
    WHERE store_id = ?1 AND entity_id = ?2 AND attribute_name = ?3;";

const READ_SQL: &str = "SELECT
        d.stringval AS stringval,
        d.numberval AS numberval,
        d.booleanval AS booleanval,
        d.timeval AS timeval,
        s.datatype AS datatype,
        s.name AS name
    FROM eav_datoms d
    INNER JOIN eav_schema s
        ON s.store_id = d.store_id AND s.name = d.attribute_name
    WHERE d.store_id = ?1 AND d.entity_id = ?2
    ORDER BY s.name ASC;";

/// Storage contract for datoms.
pub trait DatomRepository {
    /// Reads every current datom of `entity` in `store_id`.
    fn read_datoms(&self, store_id: StoreId, entity: &EntityId) -> RepoResult<Vec<Datom>>;
    /// Inserts each datom or overwrites its value on key conflict.
    ///
    /// A batch holding a NaN number is rejected with `InvalidData` before any
    /// row is written.
    fn assert_datoms(&self, store_id: StoreId, datoms: &[Datom]) -> RepoResult<()>;
    /// Deletes each datom's row; missing rows are ignored.
    fn retract_datoms(&self, store_id: StoreId, datoms: &[Datom]) -> RepoResult<()>;
}

/// SQLite-backed datom repository with lazily prepared write statements.
pub struct SqliteDatomRepository<'conn> {
    conn: &'conn Connection,
    assert_stmt: OnceCell<RefCell<Statement<'conn>>>,
    retract_stmt: OnceCell<RefCell<Statement<'conn>>>,
}

impl<'conn> SqliteDatomRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self {
            conn,
            assert_stmt: OnceCell::new(),
            retract_stmt: OnceCell::new(),
        })
    }

    fn prepared<'a>(
        &'a self,
        cell: &'a OnceCell<RefCell<Statement<'conn>>>,
        sql: &str,
    ) -> RepoResult<&'a RefCell<Statement<'conn>>> {
        let conn = self.conn;
        let stmt = cell.get_or_try_init(|| conn.prepare(sql).map(RefCell::new))?;
        Ok(stmt)
    }
}

impl DatomRepository for SqliteDatomRepository<'_> {
    fn read_datoms(&self, store_id: StoreId, entity: &EntityId) -> RepoResult<Vec<Datom>> {
        let mut stmt = self.conn.prepare(READ_SQL)?;
        let mut rows = stmt.query(params![store_id, entity])?;
        let mut datoms = Vec::new();
        while let Some(row) = rows.next()? {
            datoms.push(parse_datom_row(row, entity)?);
        }
        Ok(datoms)
    }

    fn assert_datoms(&self, store_id: StoreId, datoms: &[Datom]) -> RepoResult<()> {
        if datoms.is_empty() {
            return Ok(());
        }

        if let Some(datom) = datoms
            .iter()
            .find(|datom| datom.value.as_number().is_some_and(f64::is_nan))
        {
            return Err(RepoError::InvalidData(format!(
                "NaN is not storable for attribute `{}` of entity `{}`",
                datom.attribute, datom.entity
            )));
        }

        let mut stmt = self.prepared(&self.assert_stmt, ASSERT_SQL)?.borrow_mut();
        for datom in datoms {
            let (stringval, numberval, booleanval, timeval) = datom.value_columns();
            stmt.execute(params![
                store_id,
                &datom.entity,
                datom.attribute.as_str(),
                stringval,
                numberval,
                booleanval,
                timeval,
            ])?;
        }
        Ok(())
    }

    fn retract_datoms(&self, store_id: StoreId, datoms: &[Datom]) -> RepoResult<()> {
        if datoms.is_empty() {
            return Ok(());
        }

        let mut stmt = self.prepared(&self.retract_stmt, RETRACT_SQL)?.borrow_mut();
        for datom in datoms {
            stmt.execute(params![store_id, &datom.entity, datom.attribute.as_str()])?;
        }
        Ok(())
    }
}

fn parse_datom_row(row: &Row<'_>, entity: &EntityId) -> RepoResult<Datom> {
    let name: String = row.get("name")?;
    let code: i64 = row.get("datatype")?;
    let data_type = DataType::from_code(code).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid datatype code `{code}` for attribute `{name}` in eav_schema.datatype"
        ))
    })?;

    let value = match data_type {
        DataType::String => row.get::<_, Option<String>>("stringval")?.map(Value::String),
        DataType::Number => row.get::<_, Option<f64>>("numberval")?.map(Value::Number),
        DataType::Boolean => row.get::<_, Option<bool>>("booleanval")?.map(Value::Boolean),
        DataType::Time => row
            .get::<_, Option<DateTime<Utc>>>("timeval")?
            .map(Value::Time),
    };

    let value = value.ok_or_else(|| {
        RepoError::InvalidData(format!(
            "missing {data_type} value for attribute `{name}` of entity `{entity}`"
        ))
    })?;

    Ok(Datom::new(entity.clone(), name, value))
}
