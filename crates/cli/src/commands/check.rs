use std::path::Path;

use dbshift_storage::traits::SchemaStore;

pub(crate) async fn run(env_file: Option<&Path>) -> anyhow::Result<()> {
    let storage = super::connect(env_file).await?;
    let version = storage.ping().await?;
    println!("Connected: {version}");
    Ok(())
}
