//! Storage layer for dbshift
//!
//! PostgreSQL access through sqlx, plus an in-memory backend (feature
//! `memory`) that the service tests run migration plans against.

mod backend;
pub mod error;
#[cfg(feature = "memory")]
mod memory;
pub mod pg_storage;
pub mod traits;

pub use backend::StorageBackend;
pub use error::StorageError;
#[cfg(feature = "memory")]
pub use memory::{MemoryStorage, SchemaShape};
pub use pg_storage::PgStorage;
pub use traits::{DenormalizeStore, DuplicateStore, IdentifierStore, SchemaStore};
