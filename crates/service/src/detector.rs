use std::sync::Arc;

use dbshift_core::{DuplicateReport, NaturalKeySpec};
use dbshift_storage::StorageBackend;
use dbshift_storage::traits::DuplicateStore;

use crate::error::ServiceError;

/// Read-only scan for rows sharing a natural key. Findings are logged and
/// returned, never resolved.
pub struct DuplicateDetector {
    storage: Arc<StorageBackend>,
}

impl DuplicateDetector {
    #[must_use]
    pub const fn new(storage: Arc<StorageBackend>) -> Self {
        Self { storage }
    }

    pub async fn detect(&self, spec: &NaturalKeySpec) -> Result<DuplicateReport, ServiceError> {
        spec.validate()?;
        let groups = self.storage.natural_key_groups(spec).await?;
        for group in &groups {
            let ids: Vec<&str> = group.members.iter().map(|m| m.id.as_str()).collect();
            if group.is_expected() {
                tracing::info!(
                    table = %spec.table,
                    key = %group.key,
                    count = group.count(),
                    by = %spec.discriminator_column,
                    discriminators = ?group.discriminators(),
                    "shared key with distinct discriminators"
                );
            } else {
                tracing::warn!(
                    table = %spec.table,
                    key = %group.key,
                    count = group.count(),
                    ids = ?ids,
                    discriminators = ?group.discriminators(),
                    "DuplicateKeyDetected"
                );
            }
        }
        Ok(DuplicateReport { groups })
    }
}

#[cfg(test)]
mod tests {
    use dbshift_core::{ColumnDef, DdlAction, TableDef};
    use dbshift_storage::MemoryStorage;
    use dbshift_storage::traits::SchemaStore;

    use super::*;

    #[tokio::test]
    async fn same_email_different_provider_is_reported_untouched() {
        let memory = MemoryStorage::new();
        memory
            .apply_ddl(&DdlAction::CreateTable(TableDef::new("users", vec![
                ColumnDef::new("id", "SERIAL").primary_key(),
                ColumnDef::new("email", "VARCHAR(255)").not_null(),
                ColumnDef::new("provider", "VARCHAR(50)"),
            ])))
            .await
            .unwrap();
        for (id, email, provider) in [
            ("1", "a@x", Some("google")),
            ("2", "a@x", Some("github")),
            ("3", "b@x", Some("google")),
            ("4", "b@x", Some("google")),
            ("5", "c@x", None),
        ] {
            memory
                .insert_row("users", &[("id", Some(id)), ("email", Some(email)), ("provider", provider)])
                .unwrap();
        }
        let before = memory.rows("users");

        let detector = DuplicateDetector::new(Arc::new(StorageBackend::Memory(memory.clone())));
        let report = detector
            .detect(&NaturalKeySpec::new("users", "id", "email", "provider"))
            .await
            .unwrap();

        assert_eq!(report.groups.len(), 2);
        let expected: Vec<&str> = report.expected().map(|g| g.key.as_str()).collect();
        let unexpected: Vec<&str> = report.unexpected().map(|g| g.key.as_str()).collect();
        assert_eq!(expected, vec!["a@x"]);
        assert_eq!(unexpected, vec!["b@x"]);
        assert_eq!(report.groups[0].discriminators(), vec!["github", "google"]);
        assert_eq!(memory.rows("users"), before);
    }
}
