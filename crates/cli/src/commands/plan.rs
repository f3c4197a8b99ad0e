use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use dbshift_core::retry_policy_from_env;
use dbshift_service::{Pipeline, Plan, RunStatus, StageRecord, plans};

fn print_stages(records: &[StageRecord]) {
    for record in records {
        println!("  {}: {}", record.stage, record.result);
    }
}

pub(crate) async fn run(env_file: Option<&Path>, plan: Plan) -> anyhow::Result<()> {
    let storage = super::connect(env_file).await?;
    let pipeline = Pipeline::new(Arc::new(storage), retry_policy_from_env());

    println!("Running {} ({} stages)...", plan.name, plan.stages.len());
    let report = match pipeline.run(&plan).await {
        Ok(report) => report,
        Err(aborted) => {
            print_stages(&aborted.report.stages);
            return Err(anyhow::Error::new(aborted.error).context(format!("plan {} aborted", plan.name)));
        },
    };
    print_stages(&report.stages);

    match report.status {
        RunStatus::Success => {
            println!("{} completed", report.plan);
            Ok(())
        },
        RunStatus::Failure => anyhow::bail!("plan {} finished with failed stages", report.plan),
    }
}

pub(crate) async fn run_reset(env_file: Option<&Path>, schema: &Path, yes: bool) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("reset drops the posts and users tables with all their data; pass --yes to proceed");
    }
    let script = std::fs::read_to_string(schema)
        .with_context(|| format!("failed to read schema {}", schema.display()))?;
    println!("WARNING: dropping existing tables");
    run(env_file, plans::reset(&script)).await
}
