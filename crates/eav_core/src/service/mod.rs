//! Core EAV use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into the schema registry and store APIs.
//! - Keep callers decoupled from SQL and row decoding.

pub mod schema_service;
pub mod store_service;
