use std::sync::Arc;

use dbshift_core::{DenormalizeReport, DenormalizeSpec, SchemaObject};
use dbshift_storage::StorageBackend;
use dbshift_storage::traits::{DenormalizeStore, SchemaStore};

use crate::error::ServiceError;

/// Folds one representative child row into each parent that lacks the
/// mapped fields. Parents already carrying a value are never overwritten.
pub struct DataMigrator {
    storage: Arc<StorageBackend>,
}

impl DataMigrator {
    #[must_use]
    pub const fn new(storage: Arc<StorageBackend>) -> Self {
        Self { storage }
    }

    pub async fn migrate(&self, spec: &DenormalizeSpec) -> Result<DenormalizeReport, ServiceError> {
        let step = format!("migrate {spec}");
        spec.validate().map_err(|source| ServiceError::InvalidStep { step: step.clone(), source })?;

        let source = SchemaObject::Table { name: spec.child_table.clone() };
        let present = self.storage.object_exists(&source).await.map_err(|source| {
            ServiceError::ExistenceCheckFailed { step: step.clone(), source }
        })?;
        if !present {
            tracing::info!(%spec, "source table gone, nothing to migrate");
            return Ok(DenormalizeReport { source_missing: true, ..DenormalizeReport::default() });
        }

        let selections = self.storage.select_representatives(spec).await?;
        tracing::info!(%spec, candidates = selections.len(), "migrating child rows");

        let mut report = DenormalizeReport::default();
        for selection in &selections {
            let updated = self.storage.copy_to_parent(spec, selection).await.map_err(|source| {
                ServiceError::MutationFailed {
                    step: format!("{step} parent {}", selection.parent_key),
                    source,
                }
            })?;
            if updated {
                tracing::debug!(%spec, row = %selection.parent_key, values = ?selection.values, "copied");
                report.migrated.push(selection.parent_key.clone());
            }
        }

        report.unmigrated = self.storage.parents_lacking_fields(spec).await?;
        if !report.unmigrated.is_empty() {
            tracing::info!(%spec, count = report.unmigrated.len(), "parents without child rows left as-is");
        }
        tracing::info!(%spec, migrated = report.migrated.len(), "migration complete");
        Ok(report)
    }
}
