//! SchemaStore implementation for PgStorage.

use async_trait::async_trait;
use dbshift_core::{ColumnInfo, DdlAction, ForeignKeyInfo, SchemaObject, TableSummary};
use sqlx::Row;

use super::{PgStorage, quote_ident};
use crate::error::StorageError;
use crate::traits::SchemaStore;

const TABLE_EXISTS: &str = "SELECT EXISTS (
    SELECT 1 FROM information_schema.tables
    WHERE table_schema = current_schema() AND table_name = $1)";

const COLUMN_EXISTS: &str = "SELECT EXISTS (
    SELECT 1 FROM information_schema.columns
    WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2)";

const NOT_NULL_EXISTS: &str = "SELECT EXISTS (
    SELECT 1 FROM information_schema.columns
    WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2
      AND is_nullable = 'NO')";

const CONSTRAINT_EXISTS: &str = "SELECT EXISTS (
    SELECT 1 FROM information_schema.table_constraints
    WHERE table_schema = current_schema() AND table_name = $1 AND constraint_name = $2)";

const INDEX_EXISTS: &str = "SELECT EXISTS (
    SELECT 1 FROM pg_indexes
    WHERE schemaname = current_schema() AND indexname = $1)";

const FUNCTION_EXISTS: &str = "SELECT EXISTS (
    SELECT 1 FROM pg_proc p JOIN pg_namespace n ON n.oid = p.pronamespace
    WHERE n.nspname = current_schema() AND p.proname = $1)";

const LIST_TABLES: &str = "SELECT table_name::text FROM information_schema.tables
    WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'
    ORDER BY table_name";

const LIST_COLUMNS: &str = "SELECT column_name::text, data_type::text,
        character_maximum_length::int4, is_nullable::text = 'YES', column_default::text
    FROM information_schema.columns
    WHERE table_schema = current_schema() AND table_name = $1
    ORDER BY ordinal_position";

const LIST_INDEXES: &str = "SELECT indexname::text FROM pg_indexes
    WHERE schemaname = current_schema() AND tablename = $1
    ORDER BY indexname";

const LIST_FOREIGN_KEYS: &str = "SELECT tc.constraint_name::text, kcu.column_name::text,
        ccu.table_name::text, ccu.column_name::text
    FROM information_schema.table_constraints AS tc
    JOIN information_schema.key_column_usage AS kcu
      ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
    JOIN information_schema.constraint_column_usage AS ccu
      ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema
    WHERE tc.constraint_type = 'FOREIGN KEY'
      AND tc.table_schema = current_schema() AND tc.table_name = $1
    ORDER BY tc.constraint_name";

impl PgStorage {
    async fn exists(&self, sql: &str, binds: &[&str]) -> Result<bool, StorageError> {
        let mut query = sqlx::query_scalar::<_, bool>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    async fn describe_table(&self, name: String) -> Result<TableSummary, StorageError> {
        let columns = sqlx::query(LIST_COLUMNS)
            .bind(&name)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| {
                Ok(ColumnInfo {
                    name: row.try_get(0)?,
                    data_type: row.try_get(1)?,
                    max_length: row.try_get(2)?,
                    nullable: row.try_get(3)?,
                    default: row.try_get(4)?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let indexes: Vec<String> =
            sqlx::query_scalar(LIST_INDEXES).bind(&name).fetch_all(&self.pool).await?;

        let foreign_keys = sqlx::query(LIST_FOREIGN_KEYS)
            .bind(&name)
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| {
                Ok(ForeignKeyInfo {
                    name: row.try_get(0)?,
                    column: row.try_get(1)?,
                    foreign_table: row.try_get(2)?,
                    foreign_column: row.try_get(3)?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let row_count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(&name)))
                .fetch_one(&self.pool)
                .await?;

        Ok(TableSummary { name, columns, indexes, foreign_keys, row_count })
    }
}

#[async_trait]
impl SchemaStore for PgStorage {
    async fn object_exists(&self, object: &SchemaObject) -> Result<bool, StorageError> {
        match object {
            SchemaObject::Table { name } => self.exists(TABLE_EXISTS, &[name.as_str()]).await,
            SchemaObject::Column { table, column } => {
                self.exists(COLUMN_EXISTS, &[table.as_str(), column.as_str()]).await
            },
            SchemaObject::NotNull { table, column } => {
                self.exists(NOT_NULL_EXISTS, &[table.as_str(), column.as_str()]).await
            },
            SchemaObject::Constraint { table, name } => {
                self.exists(CONSTRAINT_EXISTS, &[table.as_str(), name.as_str()]).await
            },
            SchemaObject::Index { name } => self.exists(INDEX_EXISTS, &[name.as_str()]).await,
            SchemaObject::Function { name } => self.exists(FUNCTION_EXISTS, &[name.as_str()]).await,
        }
    }

    async fn apply_ddl(&self, action: &DdlAction) -> Result<(), StorageError> {
        let sql = action.to_sql();
        tracing::debug!(%sql, "executing DDL");
        sqlx::raw_sql(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64, StorageError> {
        let result = sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn describe_tables(&self) -> Result<Vec<TableSummary>, StorageError> {
        let names: Vec<String> = sqlx::query_scalar(LIST_TABLES).fetch_all(&self.pool).await?;
        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            tables.push(self.describe_table(name).await?);
        }
        Ok(tables)
    }

    async fn ping(&self) -> Result<String, StorageError> {
        Ok(sqlx::query_scalar("SELECT version()").fetch_one(&self.pool).await?)
    }
}
