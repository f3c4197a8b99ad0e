use async_trait::async_trait;
use dbshift_core::{DdlAction, SchemaObject, TableSummary};

use crate::error::StorageError;

/// Catalog inspection and schema mutation.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Whether `object` currently exists. An `Err` means the check itself
    /// failed, which is not the same as "absent".
    async fn object_exists(&self, object: &SchemaObject) -> Result<bool, StorageError>;

    /// Execute one validated DDL action.
    async fn apply_ddl(&self, action: &DdlAction) -> Result<(), StorageError>;

    /// Execute one raw statement from a script. Returns rows affected.
    async fn execute_statement(&self, sql: &str) -> Result<u64, StorageError>;

    /// Describe every base table in the current schema, ordered by name.
    async fn describe_tables(&self) -> Result<Vec<TableSummary>, StorageError>;

    /// Round-trip to the server; returns its version string.
    async fn ping(&self) -> Result<String, StorageError>;
}
