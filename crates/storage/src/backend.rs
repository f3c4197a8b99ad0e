//! Unified storage backend with enum dispatch.

use async_trait::async_trait;
use dbshift_core::{
    ChildSelection, DdlAction, DenormalizeSpec, DuplicateGroup, IdentifierTarget, NaturalKeySpec,
    SchemaObject, TableSummary,
};

use crate::error::StorageError;
use crate::traits::{DenormalizeStore, DuplicateStore, IdentifierStore, SchemaStore};

macro_rules! dispatch {
    ($self:expr, $trait:path, $method:ident ( $($arg:expr),* $(,)? )) => {
        match $self {
            StorageBackend::Postgres(s) => <crate::pg_storage::PgStorage as $trait>::$method(s, $($arg),*).await,
            #[cfg(feature = "memory")]
            StorageBackend::Memory(s) => <crate::memory::MemoryStorage as $trait>::$method(s, $($arg),*).await,
        }
    };
}

#[derive(Clone, Debug)]
pub enum StorageBackend {
    Postgres(crate::pg_storage::PgStorage),
    #[cfg(feature = "memory")]
    Memory(crate::memory::MemoryStorage),
}

impl StorageBackend {
    pub async fn new_postgres(database_url: &str) -> Result<Self, StorageError> {
        Ok(Self::Postgres(crate::pg_storage::PgStorage::new(database_url).await?))
    }

    #[cfg(feature = "memory")]
    pub fn new_memory() -> Self {
        Self::Memory(crate::memory::MemoryStorage::new())
    }
}

// ── SchemaStore ──────────────────────────────────────────────────

#[async_trait]
impl SchemaStore for StorageBackend {
    async fn object_exists(&self, object: &SchemaObject) -> Result<bool, StorageError> {
        dispatch!(self, SchemaStore, object_exists(object))
    }

    async fn apply_ddl(&self, action: &DdlAction) -> Result<(), StorageError> {
        dispatch!(self, SchemaStore, apply_ddl(action))
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64, StorageError> {
        dispatch!(self, SchemaStore, execute_statement(sql))
    }

    async fn describe_tables(&self) -> Result<Vec<TableSummary>, StorageError> {
        dispatch!(self, SchemaStore, describe_tables())
    }

    async fn ping(&self) -> Result<String, StorageError> {
        dispatch!(self, SchemaStore, ping())
    }
}

// ── IdentifierStore ──────────────────────────────────────────────

#[async_trait]
impl IdentifierStore for StorageBackend {
    async fn identifier_exists(
        &self,
        target: &IdentifierTarget,
        value: &str,
    ) -> Result<bool, StorageError> {
        dispatch!(self, IdentifierStore, identifier_exists(target, value))
    }

    async fn rows_missing_identifier(
        &self,
        target: &IdentifierTarget,
    ) -> Result<Vec<String>, StorageError> {
        dispatch!(self, IdentifierStore, rows_missing_identifier(target))
    }

    async fn assign_identifier(
        &self,
        target: &IdentifierTarget,
        row_key: &str,
        value: &str,
    ) -> Result<bool, StorageError> {
        dispatch!(self, IdentifierStore, assign_identifier(target, row_key, value))
    }
}

// ── DenormalizeStore ─────────────────────────────────────────────

#[async_trait]
impl DenormalizeStore for StorageBackend {
    async fn select_representatives(
        &self,
        spec: &DenormalizeSpec,
    ) -> Result<Vec<ChildSelection>, StorageError> {
        dispatch!(self, DenormalizeStore, select_representatives(spec))
    }

    async fn copy_to_parent(
        &self,
        spec: &DenormalizeSpec,
        selection: &ChildSelection,
    ) -> Result<bool, StorageError> {
        dispatch!(self, DenormalizeStore, copy_to_parent(spec, selection))
    }

    async fn parents_lacking_fields(
        &self,
        spec: &DenormalizeSpec,
    ) -> Result<Vec<String>, StorageError> {
        dispatch!(self, DenormalizeStore, parents_lacking_fields(spec))
    }
}

// ── DuplicateStore ───────────────────────────────────────────────

#[async_trait]
impl DuplicateStore for StorageBackend {
    async fn natural_key_groups(
        &self,
        spec: &NaturalKeySpec,
    ) -> Result<Vec<DuplicateGroup>, StorageError> {
        dispatch!(self, DuplicateStore, natural_key_groups(spec))
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use dbshift_core::{ColumnDef, TableDef};

    use super::*;

    #[tokio::test]
    async fn memory_variant_dispatches() {
        let backend = StorageBackend::new_memory();
        assert_eq!(backend.ping().await.unwrap(), "in-memory");
        let create = DdlAction::CreateTable(TableDef::new(
            "users",
            vec![ColumnDef::new("id", "SERIAL").primary_key()],
        ));
        backend.apply_ddl(&create).await.unwrap();
        assert!(backend.object_exists(&create.target()).await.unwrap());
    }
}
