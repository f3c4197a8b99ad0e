//! Sequential execution of a migration plan.
//!
//! Stages run strictly in order and each outcome is recorded before the next
//! stage starts. Step errors abort the run. Identifier exhaustion only fails
//! its own backfill stage: the dependent NOT NULL is skipped, the remaining
//! stages still run, and the report ends as [`RunStatus::Failure`].

use std::fmt;
use std::sync::Arc;

use dbshift_core::{
    BackfillReport, DdlAction, DenormalizeReport, DenormalizeSpec, DuplicateReport,
    IdentifierTarget, MigrationStep, NaturalKeySpec, RetryPolicy, StepOutcome,
};
use dbshift_storage::StorageBackend;

use crate::applier::DdlApplier;
use crate::detector::DuplicateDetector;
use crate::error::ServiceError;
use crate::identifier::IdentifierGenerator;
use crate::migrator::DataMigrator;
use crate::script_runner::ScriptRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Ddl(MigrationStep),
    /// Fill NULL identifiers, then optionally declare the column NOT NULL.
    Backfill { target: IdentifierTarget, tighten: bool },
    Denormalize(DenormalizeSpec),
    DetectDuplicates(NaturalKeySpec),
    Script { label: String, statements: Vec<String> },
}

impl Stage {
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Ddl(step) => step.name.clone(),
            Self::Backfill { target, .. } => format!("backfill {target}"),
            Self::Denormalize(spec) => format!("migrate {spec}"),
            Self::DetectDuplicates(spec) => {
                format!("detect duplicate {}.{}", spec.table, spec.key_column)
            },
            Self::Script { label, .. } => label.clone(),
        }
    }
}

/// Named, ordered list of stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub name: String,
    pub stages: Vec<Stage>,
}

impl Plan {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self { name: name.into(), stages }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Step(StepOutcome),
    Backfill { report: BackfillReport, tightened: Option<StepOutcome> },
    Denormalize(DenormalizeReport),
    Duplicates(DuplicateReport),
    Script { statements: usize },
    Failed { reason: String },
}

impl fmt::Display for StageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(outcome) => f.write_str(outcome.as_str()),
            Self::Backfill { report, tightened } => {
                write!(f, "{} assigned, {} skipped", report.assigned.len(), report.skipped.len())?;
                if let Some(outcome) = tightened {
                    write!(f, ", NOT NULL {}", outcome.as_str())?;
                }
                Ok(())
            },
            Self::Denormalize(report) if report.source_missing => f.write_str("source table absent"),
            Self::Denormalize(report) => write!(
                f,
                "{} migrated, {} without child rows",
                report.migrated.len(),
                report.unmigrated.len()
            ),
            Self::Duplicates(report) => write!(
                f,
                "{} groups ({} unexpected)",
                report.groups.len(),
                report.unexpected().count()
            ),
            Self::Script { statements } => write!(f, "{statements} statements executed"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: String,
    pub result: StageResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub plan: String,
    pub stages: Vec<StageRecord>,
    pub status: RunStatus,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn result_of(&self, stage: &str) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage == stage).map(|r| &r.result)
    }
}

/// A fail-fast abort. `report` holds every stage that finished, followed by
/// the aborting stage recorded as [`StageResult::Failed`].
#[derive(Debug, thiserror::Error)]
#[error("plan {} aborted: {error}", .report.plan)]
pub struct RunAborted {
    pub report: RunReport,
    #[source]
    pub error: ServiceError,
}

impl RunAborted {
    /// Stages that completed before the abort.
    pub fn completed(&self) -> &[StageRecord] {
        match self.report.stages.split_last() {
            Some((_, done)) => done,
            None => &[],
        }
    }
}

pub struct Pipeline {
    applier: DdlApplier,
    generator: IdentifierGenerator,
    migrator: DataMigrator,
    detector: DuplicateDetector,
    runner: ScriptRunner,
}

impl Pipeline {
    #[must_use]
    pub fn new(storage: Arc<StorageBackend>, policy: RetryPolicy) -> Self {
        Self {
            applier: DdlApplier::new(Arc::clone(&storage)),
            generator: IdentifierGenerator::new(Arc::clone(&storage), policy),
            migrator: DataMigrator::new(Arc::clone(&storage)),
            detector: DuplicateDetector::new(Arc::clone(&storage)),
            runner: ScriptRunner::new(storage),
        }
    }

    pub async fn run(&self, plan: &Plan) -> Result<RunReport, RunAborted> {
        tracing::info!(plan = %plan.name, stages = plan.stages.len(), "running plan");
        let mut records = Vec::with_capacity(plan.stages.len());
        for stage in &plan.stages {
            let label = stage.label();
            let result = match self.run_stage(stage).await {
                Ok(result) => result,
                Err(error) => {
                    tracing::error!(plan = %plan.name, stage = %label, %error, "plan aborted");
                    records.push(StageRecord {
                        stage: label,
                        result: StageResult::Failed { reason: error.to_string() },
                    });
                    let report = RunReport {
                        plan: plan.name.clone(),
                        stages: records,
                        status: RunStatus::Failure,
                    };
                    return Err(RunAborted { report, error });
                },
            };
            tracing::info!(plan = %plan.name, stage = %label, outcome = %result, "stage finished");
            records.push(StageRecord { stage: label, result });
        }

        let failed = records.iter().any(|r| matches!(r.result, StageResult::Failed { .. }));
        let status = if failed { RunStatus::Failure } else { RunStatus::Success };
        tracing::info!(plan = %plan.name, status = ?status, "plan finished");
        Ok(RunReport { plan: plan.name.clone(), stages: records, status })
    }

    async fn run_stage(&self, stage: &Stage) -> Result<StageResult, ServiceError> {
        Ok(match stage {
            Stage::Ddl(step) => StageResult::Step(self.applier.apply(step).await?),
            Stage::Backfill { target, tighten } => match self.generator.backfill(target).await {
                Ok(report) => {
                    let tightened = if *tighten {
                        Some(self.applier.apply(&tighten_step(target)).await?)
                    } else {
                        None
                    };
                    StageResult::Backfill { report, tightened }
                },
                Err(e) if e.is_collision_exhausted() => {
                    tracing::error!(%target, error = %e, "backfill failed, NOT NULL not applied");
                    StageResult::Failed { reason: e.to_string() }
                },
                Err(e) => return Err(e),
            },
            Stage::Denormalize(spec) => StageResult::Denormalize(self.migrator.migrate(spec).await?),
            Stage::DetectDuplicates(spec) => {
                StageResult::Duplicates(self.detector.detect(spec).await?)
            },
            Stage::Script { label, statements } => StageResult::Script {
                statements: self.runner.run_statements(label, statements).await?,
            },
        })
    }
}

fn tighten_step(target: &IdentifierTarget) -> MigrationStep {
    MigrationStep::new(
        format!("set {target} NOT NULL"),
        DdlAction::SetNotNull { table: target.table.clone(), column: target.column.clone() },
    )
}

#[cfg(test)]
mod tests {
    use dbshift_core::{ColumnDef, IdFormat, TableDef};
    use dbshift_storage::MemoryStorage;

    use super::*;

    fn users_table() -> Stage {
        Stage::Ddl(MigrationStep::new(
            "create users",
            DdlAction::CreateTable(TableDef::new("users", vec![
                ColumnDef::new("id", "SERIAL").primary_key(),
                ColumnDef::new("user_id", "VARCHAR(1)").unique(),
            ])),
        ))
    }

    fn marker_table(name: &str) -> Stage {
        Stage::Ddl(MigrationStep::new(
            format!("create {name}"),
            DdlAction::CreateTable(TableDef::new(name, vec![ColumnDef::new("id", "INTEGER")])),
        ))
    }

    fn backfill() -> Stage {
        Stage::Backfill {
            target: IdentifierTarget::new("users", "id", "user_id", IdFormat::new(1).unwrap()),
            tighten: true,
        }
    }

    fn pipeline(memory: &MemoryStorage, policy: RetryPolicy) -> Pipeline {
        Pipeline::new(Arc::new(StorageBackend::Memory(memory.clone())), policy)
    }

    #[tokio::test]
    async fn collision_exhaustion_skips_not_null_and_continues() {
        let memory = MemoryStorage::new();
        let pipeline = pipeline(&memory, RetryPolicy::new(0, 9));
        pipeline.run(&Plan::new("setup", vec![users_table()])).await.unwrap();
        for id in 1..=10 {
            memory.insert_row("users", &[("id", Some(id.to_string().as_str()))]).unwrap();
        }

        let plan = Plan::new("fill", vec![backfill(), marker_table("after")]);
        let report = pipeline.run(&plan).await.unwrap();

        assert_eq!(report.status, RunStatus::Failure);
        assert!(matches!(report.result_of("backfill users.user_id"), Some(StageResult::Failed { .. })));
        assert_eq!(report.result_of("create after"), Some(&StageResult::Step(StepOutcome::Applied)));
        assert_eq!(memory.column_values("users", "user_id").into_iter().flatten().count(), 9);
        assert_eq!(memory.column_nullable("users", "user_id"), Some(true));
    }

    #[tokio::test]
    async fn successful_backfill_tightens_column() {
        let memory = MemoryStorage::new();
        let pipeline = pipeline(&memory, RetryPolicy::default());
        let report = pipeline.run(&Plan::new("fill", vec![users_table(), backfill()])).await.unwrap();
        assert!(report.is_success());
        assert_eq!(
            report.result_of("backfill users.user_id"),
            Some(&StageResult::Backfill {
                report: BackfillReport::default(),
                tightened: Some(StepOutcome::Applied),
            })
        );
        assert_eq!(memory.column_nullable("users", "user_id"), Some(false));
    }

    #[tokio::test]
    async fn failing_existence_check_aborts_with_step_name() {
        let memory = MemoryStorage::new();
        let pipeline = pipeline(&memory, RetryPolicy::default());
        memory.set_failing_existence_checks(true);
        let plan = Plan::new("broken", vec![users_table(), marker_table("after")]);
        let aborted = pipeline.run(&plan).await.unwrap_err();
        assert!(matches!(aborted.error, ServiceError::ExistenceCheckFailed { .. }));
        assert_eq!(aborted.error.step(), Some("create users"));
        assert!(aborted.completed().is_empty());
        assert!(!memory.has_table("after"));
    }

    #[tokio::test]
    async fn abort_keeps_records_of_finished_stages() {
        let memory = MemoryStorage::new();
        let pipeline = pipeline(&memory, RetryPolicy::default());
        let bad_step = Stage::Ddl(MigrationStep::new(
            "set users.email NOT NULL",
            DdlAction::SetNotNull { table: "users".to_owned(), column: "email".to_owned() },
        ));
        let plan = Plan::new("partial", vec![
            users_table(),
            marker_table("audit"),
            bad_step,
            marker_table("after"),
        ]);

        let aborted = pipeline.run(&plan).await.unwrap_err();
        assert!(matches!(aborted.error, ServiceError::MutationFailed { .. }));
        assert_eq!(aborted.report.status, RunStatus::Failure);
        let done: Vec<&str> = aborted.completed().iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(done, vec!["create users", "create audit"]);
        assert!(aborted.completed().iter().all(|r| r.result == StageResult::Step(StepOutcome::Applied)));
        assert!(matches!(
            aborted.report.result_of("set users.email NOT NULL"),
            Some(StageResult::Failed { .. })
        ));
        assert!(aborted.to_string().starts_with("plan partial aborted: set users.email NOT NULL failed"));
        assert!(memory.has_table("audit"));
        assert!(!memory.has_table("after"));
    }

    #[test]
    fn stage_labels_name_their_work() {
        assert_eq!(backfill().label(), "backfill users.user_id");
        let script = Stage::Script { label: "schema".to_owned(), statements: Vec::new() };
        assert_eq!(script.label(), "schema");
    }
}
