use async_trait::async_trait;
use dbshift_core::IdentifierTarget;

use crate::error::StorageError;

/// Row-level access to a generated identifier column.
#[async_trait]
pub trait IdentifierStore: Send + Sync {
    /// Whether any row already holds `value` in the target column.
    async fn identifier_exists(
        &self,
        target: &IdentifierTarget,
        value: &str,
    ) -> Result<bool, StorageError>;

    /// Keys of rows whose identifier is NULL, in ascending key order.
    async fn rows_missing_identifier(
        &self,
        target: &IdentifierTarget,
    ) -> Result<Vec<String>, StorageError>;

    /// Set the identifier of one row if it is still NULL.
    ///
    /// Returns `false` when the row was filled (or removed) in the meantime.
    /// A uniqueness violation surfaces as [`StorageError::Duplicate`].
    async fn assign_identifier(
        &self,
        target: &IdentifierTarget,
        row_key: &str,
        value: &str,
    ) -> Result<bool, StorageError>;
}
