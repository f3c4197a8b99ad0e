use std::sync::Arc;

use dbshift_core::{DdlAction, MigrationStep, StepOutcome};
use dbshift_storage::StorageBackend;
use dbshift_storage::traits::SchemaStore;

use crate::error::ServiceError;

/// Applies one [`MigrationStep`] at a time, checking the catalog first so a
/// rerun never repeats a mutation.
pub struct DdlApplier {
    storage: Arc<StorageBackend>,
}

impl DdlApplier {
    #[must_use]
    pub const fn new(storage: Arc<StorageBackend>) -> Self {
        Self { storage }
    }

    pub async fn apply(&self, step: &MigrationStep) -> Result<StepOutcome, ServiceError> {
        step.action
            .validate()
            .map_err(|source| ServiceError::InvalidStep { step: step.name.clone(), source })?;

        let target = step.target();
        let exists = self.storage.object_exists(&target).await.map_err(|source| {
            ServiceError::ExistenceCheckFailed { step: step.name.clone(), source }
        })?;

        if step.action.satisfied_by(exists) {
            tracing::info!(step = %step, %target, "already satisfied");
            return Ok(StepOutcome::AlreadySatisfied);
        }

        match self.storage.apply_ddl(&step.action).await {
            Ok(()) => {
                tracing::info!(step = %step, %target, "applied");
                Ok(StepOutcome::Applied)
            },
            // Another writer created the constraint between check and apply.
            Err(e) if e.is_already_exists() && matches!(step.action, DdlAction::AddConstraint { .. }) => {
                tracing::info!(step = %step, %target, "created concurrently, treating as satisfied");
                Ok(StepOutcome::AlreadySatisfied)
            },
            Err(source) => {
                tracing::error!(step = %step, error = %source, "step failed");
                Err(ServiceError::MutationFailed { step: step.name.clone(), source })
            },
        }
    }

    /// Apply steps in order, stopping at the first error.
    pub async fn apply_all(
        &self,
        steps: &[MigrationStep],
    ) -> Result<Vec<StepOutcome>, ServiceError> {
        let mut outcomes = Vec::with_capacity(steps.len());
        for step in steps {
            outcomes.push(self.apply(step).await?);
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use dbshift_core::{ColumnDef, ConstraintKind, TableDef};
    use dbshift_storage::MemoryStorage;

    use super::*;

    fn setup() -> (MemoryStorage, DdlApplier) {
        let memory = MemoryStorage::new();
        let applier = DdlApplier::new(Arc::new(StorageBackend::Memory(memory.clone())));
        (memory, applier)
    }

    fn create_users() -> MigrationStep {
        MigrationStep::new(
            "create users",
            DdlAction::CreateTable(TableDef::new(
                "users",
                vec![
                    ColumnDef::new("id", "SERIAL").primary_key(),
                    ColumnDef::new("email", "VARCHAR(255)").not_null().unique(),
                    ColumnDef::new("username", "VARCHAR(50)"),
                ],
            )),
        )
    }

    fn add_unique() -> MigrationStep {
        MigrationStep::new(
            "add users_email_username_unique",
            DdlAction::AddConstraint {
                table: "users".to_owned(),
                name: "users_email_username_unique".to_owned(),
                kind: ConstraintKind::unique(&["email", "username"]),
            },
        )
    }

    #[tokio::test]
    async fn second_apply_is_already_satisfied() {
        let (memory, applier) = setup();
        let steps = [
            create_users(),
            MigrationStep::new(
                "add users.user_id",
                DdlAction::AddColumn {
                    table: "users".to_owned(),
                    column: ColumnDef::new("user_id", "VARCHAR(10)").unique(),
                },
            ),
            add_unique(),
        ];
        let first = applier.apply_all(&steps).await.unwrap();
        assert!(first.iter().all(|o| *o == StepOutcome::Applied));
        let shape = memory.schema_shape();

        let second = applier.apply_all(&steps).await.unwrap();
        assert!(second.iter().all(|o| *o == StepOutcome::AlreadySatisfied));
        assert_eq!(memory.schema_shape(), shape);
    }

    #[tokio::test]
    async fn drop_of_absent_object_touches_nothing() {
        let (memory, applier) = setup();
        applier.apply(&create_users()).await.unwrap();
        let shape = memory.schema_shape();
        let drop = MigrationStep::new(
            "drop accounts",
            DdlAction::DropTable { name: "accounts".to_owned(), cascade: true },
        );
        assert_eq!(applier.apply(&drop).await.unwrap(), StepOutcome::AlreadySatisfied);
        assert_eq!(memory.schema_shape(), shape);
    }

    #[tokio::test]
    async fn constraint_created_concurrently_is_satisfied() {
        let (memory, applier) = setup();
        applier.apply(&create_users()).await.unwrap();
        applier.apply(&add_unique()).await.unwrap();

        memory.set_stale_catalog(true);
        assert_eq!(applier.apply(&add_unique()).await.unwrap(), StepOutcome::AlreadySatisfied);
    }

    #[tokio::test]
    async fn stale_catalog_does_not_hide_other_conflicts() {
        let (memory, applier) = setup();
        applier.apply(&create_users()).await.unwrap();
        memory.set_stale_catalog(true);
        let err = applier.apply(&create_users()).await.unwrap_err();
        assert!(matches!(err, ServiceError::MutationFailed { .. }));
        assert_eq!(err.step(), Some("create users"));
    }

    #[tokio::test]
    async fn failing_existence_check_is_not_absence() {
        let (memory, applier) = setup();
        memory.set_failing_existence_checks(true);
        let err = applier.apply(&create_users()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ExistenceCheckFailed { .. }));
        assert_eq!(err.step(), Some("create users"));
        assert!(err.is_transient());
        assert!(!memory.has_table("users"));
    }

    #[tokio::test]
    async fn invalid_identifier_never_reaches_the_store() {
        let (memory, applier) = setup();
        memory.set_failing_existence_checks(true);
        let step = MigrationStep::new(
            "drop bad",
            DdlAction::DropTable { name: "users; DROP TABLE x".to_owned(), cascade: false },
        );
        let err = applier.apply(&step).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidStep { .. }));
    }

    #[tokio::test]
    async fn mixed_case_table_is_rejected_before_any_ddl() {
        let (memory, applier) = setup();
        let step = MigrationStep::new(
            "create AppUsers",
            DdlAction::CreateTable(TableDef::new(
                "AppUsers",
                vec![ColumnDef::new("id", "SERIAL").primary_key()],
            )),
        );
        for _ in 0..2 {
            let err = applier.apply(&step).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidStep { .. }));
            assert_eq!(err.step(), Some("create AppUsers"));
        }
        assert!(!memory.has_table("AppUsers"));
        assert!(memory.schema_shape().tables.is_empty());
    }

    #[tokio::test]
    async fn set_not_null_over_nulls_fails_the_step() {
        let (memory, applier) = setup();
        applier.apply(&create_users()).await.unwrap();
        memory.insert_row("users", &[("id", Some("1")), ("email", Some("a@x"))]).unwrap();
        let step = MigrationStep::new(
            "set users.username NOT NULL",
            DdlAction::SetNotNull { table: "users".to_owned(), column: "username".to_owned() },
        );
        let err = applier.apply(&step).await.unwrap_err();
        assert!(matches!(err, ServiceError::MutationFailed { .. }));
    }
}
