//! Unique identifier generation and backfill.
//!
//! Values are drawn at random and checked against the store. When the random
//! budget runs out, a clock-seeded linear probe takes over, so a nearly full
//! range still terminates within [`RetryPolicy::total_budget`] lookups.

use std::sync::Arc;

use dbshift_core::{BackfillReport, IdFormat, IdentifierTarget, RetryPolicy};
use dbshift_storage::StorageBackend;
use dbshift_storage::traits::IdentifierStore;
use rand::Rng;

use crate::error::ServiceError;

fn draw(format: &IdFormat) -> String {
    format.render(rand::thread_rng().gen_range(format.range()))
}

fn clock_seed() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

pub struct IdentifierGenerator {
    storage: Arc<StorageBackend>,
    policy: RetryPolicy,
}

impl IdentifierGenerator {
    #[must_use]
    pub const fn new(storage: Arc<StorageBackend>, policy: RetryPolicy) -> Self {
        Self { storage, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// A value not currently held by any row of the target column.
    pub async fn generate(&self, target: &IdentifierTarget) -> Result<String, ServiceError> {
        target.validate()?;
        let format = &target.format;
        for _ in 0..self.policy.max_attempts {
            let candidate = draw(format);
            if !self.storage.identifier_exists(target, &candidate).await? {
                return Ok(candidate);
            }
        }

        let seed = clock_seed();
        tracing::warn!(
            %target,
            attempts = self.policy.max_attempts,
            seed,
            "random draws exhausted, probing from clock seed"
        );
        for offset in 0..u64::from(self.policy.fallback_probes) {
            let candidate = format.render(format.fallback_candidate(seed, offset));
            if !self.storage.identifier_exists(target, &candidate).await? {
                return Ok(candidate);
            }
        }

        Err(ServiceError::CollisionExhausted {
            target: target.to_string(),
            attempts: self.policy.total_budget(),
        })
    }

    /// Give every row with a NULL identifier a fresh value, in key order.
    ///
    /// Values written before a [`ServiceError::CollisionExhausted`] stay.
    pub async fn backfill(&self, target: &IdentifierTarget) -> Result<BackfillReport, ServiceError> {
        target.validate()?;
        let rows = self.storage.rows_missing_identifier(target).await?;
        tracing::info!(%target, rows = rows.len(), "backfilling identifiers");

        let mut report = BackfillReport::default();
        for row in rows {
            match self.assign(target, &row).await? {
                Some(value) => report.assigned.push((row, value)),
                None => {
                    tracing::debug!(%target, row = %row, "row filled elsewhere, skipping");
                    report.skipped.push(row);
                },
            }
        }
        tracing::info!(
            %target,
            assigned = report.assigned.len(),
            skipped = report.skipped.len(),
            "backfill complete"
        );
        Ok(report)
    }

    async fn assign(
        &self,
        target: &IdentifierTarget,
        row: &str,
    ) -> Result<Option<String>, ServiceError> {
        let attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=attempts {
            let value = self.generate(target).await?;
            match self.storage.assign_identifier(target, row, &value).await {
                Ok(true) => {
                    tracing::debug!(%target, row = %row, %value, "assigned");
                    return Ok(Some(value));
                },
                Ok(false) => return Ok(None),
                Err(e) if e.is_duplicate() => {
                    tracing::warn!(%target, row = %row, %value, attempt, "value taken concurrently");
                },
                Err(source) => {
                    return Err(ServiceError::MutationFailed {
                        step: format!("backfill {target} row {row}"),
                        source,
                    });
                },
            }
        }
        Err(ServiceError::CollisionExhausted {
            target: target.to_string(),
            attempts: u64::from(attempts),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use dbshift_core::{ColumnDef, DdlAction, TableDef};
    use dbshift_storage::MemoryStorage;
    use dbshift_storage::traits::SchemaStore;

    use super::*;

    async fn setup(
        digits: u32,
        policy: RetryPolicy,
    ) -> (MemoryStorage, IdentifierGenerator, IdentifierTarget) {
        let memory = MemoryStorage::new();
        memory
            .apply_ddl(&DdlAction::CreateTable(TableDef::new(
                "users",
                vec![
                    ColumnDef::new("id", "SERIAL").primary_key(),
                    ColumnDef::new("user_id", "VARCHAR(18)").unique(),
                ],
            )))
            .await
            .unwrap();
        let generator =
            IdentifierGenerator::new(Arc::new(StorageBackend::Memory(memory.clone())), policy);
        let target = IdentifierTarget::new("users", "id", "user_id", IdFormat::new(digits).unwrap());
        (memory, generator, target)
    }

    fn insert(memory: &MemoryStorage, id: u32, user_id: Option<&str>) {
        let id = id.to_string();
        memory.insert_row("users", &[("id", Some(id.as_str())), ("user_id", user_id)]).unwrap();
    }

    #[tokio::test]
    async fn generated_value_is_well_formed_and_free() {
        let (memory, generator, target) = setup(10, RetryPolicy::default()).await;
        insert(&memory, 1, Some("1234567890"));
        let value = generator.generate(&target).await.unwrap();
        assert!(target.format.matches(&value));
        assert_ne!(value, "1234567890");
    }

    #[tokio::test]
    async fn fallback_finds_last_free_value() {
        let (memory, generator, target) = setup(1, RetryPolicy::new(0, 9)).await;
        for (id, digit) in (1..=8).map(|d| (d, d.to_string())) {
            insert(&memory, id, Some(digit.as_str()));
        }
        assert_eq!(generator.generate(&target).await.unwrap(), "9");
    }

    #[tokio::test]
    async fn full_range_is_exhausted_not_looped() {
        let (memory, generator, target) = setup(1, RetryPolicy::new(5, 9)).await;
        for (id, digit) in (1..=9).map(|d| (d, d.to_string())) {
            insert(&memory, id, Some(digit.as_str()));
        }
        let err = generator.generate(&target).await.unwrap_err();
        assert!(matches!(err, ServiceError::CollisionExhausted { attempts: 14, .. }));
    }

    #[tokio::test]
    async fn backfill_assigns_unique_values_in_key_order() {
        let (memory, generator, target) = setup(10, RetryPolicy::default()).await;
        for id in [3, 1, 2] {
            insert(&memory, id, None);
        }
        insert(&memory, 4, Some("5555555555"));

        let report = generator.backfill(&target).await.unwrap();
        let keys: Vec<&str> = report.assigned.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["1", "2", "3"]);

        let values: Vec<String> =
            memory.column_values("users", "user_id").into_iter().flatten().collect();
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|v| target.format.matches(v)));
        assert_eq!(values.iter().collect::<HashSet<_>>().len(), 4);
    }

    #[tokio::test]
    async fn backfill_is_a_no_op_when_complete() {
        let (memory, generator, target) = setup(10, RetryPolicy::default()).await;
        insert(&memory, 1, Some("1111111111"));
        let report = generator.backfill(&target).await.unwrap();
        assert!(report.assigned.is_empty());
        assert_eq!(memory.column_values("users", "user_id"), vec![Some("1111111111".to_owned())]);
    }

    #[tokio::test]
    async fn exhaustion_keeps_values_already_written() {
        let (memory, generator, target) = setup(1, RetryPolicy::new(0, 9)).await;
        for (id, digit) in (1..=7).map(|d| (d, d.to_string())) {
            insert(&memory, id, Some(digit.as_str()));
        }
        for id in 8..=10 {
            insert(&memory, id, None);
        }
        let err = generator.backfill(&target).await.unwrap_err();
        assert!(err.is_collision_exhausted());
        let filled = memory.column_values("users", "user_id").into_iter().flatten().count();
        assert_eq!(filled, 9);
    }
}
