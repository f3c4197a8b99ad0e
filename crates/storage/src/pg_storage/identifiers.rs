//! IdentifierStore implementation for PgStorage.

use async_trait::async_trait;
use dbshift_core::IdentifierTarget;

use super::PgStorage;
use crate::error::StorageError;
use crate::traits::IdentifierStore;

#[async_trait]
impl IdentifierStore for PgStorage {
    async fn identifier_exists(
        &self,
        target: &IdentifierTarget,
        value: &str,
    ) -> Result<bool, StorageError> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
            target.table, target.column
        );
        Ok(sqlx::query_scalar(&sql).bind(value).fetch_one(&self.pool).await?)
    }

    async fn rows_missing_identifier(
        &self,
        target: &IdentifierTarget,
    ) -> Result<Vec<String>, StorageError> {
        let sql = format!(
            "SELECT {key}::text FROM {table} WHERE {column} IS NULL ORDER BY {key}",
            key = target.key_column,
            table = target.table,
            column = target.column,
        );
        Ok(sqlx::query_scalar(&sql).fetch_all(&self.pool).await?)
    }

    async fn assign_identifier(
        &self,
        target: &IdentifierTarget,
        row_key: &str,
        value: &str,
    ) -> Result<bool, StorageError> {
        let sql = format!(
            "UPDATE {table} SET {column} = $1 WHERE {key}::text = $2 AND {column} IS NULL",
            key = target.key_column,
            table = target.table,
            column = target.column,
        );
        let result = sqlx::query(&sql).bind(value).bind(row_key).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
