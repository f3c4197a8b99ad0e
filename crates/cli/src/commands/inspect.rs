use std::path::Path;

use dbshift_storage::traits::SchemaStore;

pub(crate) async fn run(env_file: Option<&Path>) -> anyhow::Result<()> {
    let storage = super::connect(env_file).await?;
    let tables = storage.describe_tables().await?;
    tracing::info!(tables = tables.len(), "schema inspected");
    println!("{}", serde_json::to_string_pretty(&tables)?);
    Ok(())
}
