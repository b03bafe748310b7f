//! Entity-attribute-value store core over SQLite.
//!
//! Callers define typed attributes per numeric store, then attach facts to
//! opaque entity ids and merge-update them. Stores share tables and are
//! isolated only by `store_id`.
//!
//! ```no_run
//! use eav_core::db::open_db_in_memory;
//! use eav_core::{Changes, DataType, SqliteStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = open_db_in_memory()?;
//! let store = SqliteStore::try_new(&conn, 1)?;
//! store.define_attribute("count", DataType::Number)?;
//! let merged = store.update("e1", Changes::new().set("count", 359))?;
//! assert_eq!(merged["count"].as_number(), Some(359.0));
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::attribute::{Attribute, StoreId};
pub use model::datatype::{CoercionError, DataType, RawValue, Value};
pub use model::datom::Datom;
pub use model::entity::EntityId;
pub use repo::datom_repo::{DatomRepository, SqliteDatomRepository};
pub use repo::schema_repo::{SchemaRepository, SqliteSchemaRepository};
pub use repo::{RepoError, RepoResult};
pub use service::schema_service::SchemaRegistry;
pub use service::store_service::{
    Attributes, Changes, SqliteStore, Store, StoreError, StoreResult,
};
