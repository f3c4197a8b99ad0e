use async_trait::async_trait;
use dbshift_core::{ChildSelection, DenormalizeSpec, DuplicateGroup, NaturalKeySpec};

use crate::error::StorageError;

/// Bulk reads and guarded writes for folding a child table into its parent.
#[async_trait]
pub trait DenormalizeStore: Send + Sync {
    /// One child row per parent that still lacks every mapped field, chosen by
    /// `spec.order_by`, ordered by parent key.
    async fn select_representatives(
        &self,
        spec: &DenormalizeSpec,
    ) -> Result<Vec<ChildSelection>, StorageError>;

    /// Write a selection onto its parent if the parent still lacks every
    /// mapped field. Returns whether the parent was updated.
    async fn copy_to_parent(
        &self,
        spec: &DenormalizeSpec,
        selection: &ChildSelection,
    ) -> Result<bool, StorageError>;

    /// Keys of parents whose mapped fields are all NULL, ascending.
    async fn parents_lacking_fields(
        &self,
        spec: &DenormalizeSpec,
    ) -> Result<Vec<String>, StorageError>;
}

/// Natural-key grouping for post-migration validation. Read-only.
#[async_trait]
pub trait DuplicateStore: Send + Sync {
    /// Groups of more than one row sharing a non-NULL natural key, ordered by
    /// key; members ordered by discriminator (NULLs last) then id.
    async fn natural_key_groups(
        &self,
        spec: &NaturalKeySpec,
    ) -> Result<Vec<DuplicateGroup>, StorageError>;
}
