//! EAV domain model.
//!
//! # Responsibility
//! - Define attribute datatypes, canonical values and coercion rules.
//! - Define attribute, entity id and datom shapes shared by repo/service.
//!
//! # Invariants
//! - A datom's datatype is derived from its value and always matches the
//!   attribute it was coerced against.

pub mod attribute;
pub mod datatype;
pub mod datom;
pub mod entity;
