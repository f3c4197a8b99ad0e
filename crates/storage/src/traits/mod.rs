//! Storage backend trait abstraction
//!
//! Async domain traits for the migration engine, implemented by the
//! PostgreSQL backend and the in-memory backend.

pub mod denormalize;
pub mod identifier;
pub mod schema;

pub use denormalize::{DenormalizeStore, DuplicateStore};
pub use identifier::IdentifierStore;
pub use schema::SchemaStore;
