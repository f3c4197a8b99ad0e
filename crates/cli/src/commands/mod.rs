use std::path::Path;

use anyhow::Context as _;
use dbshift_core::{DatabaseConfig, load_env_files};
use dbshift_storage::StorageBackend;

pub(crate) mod check;
pub(crate) mod inspect;
pub(crate) mod plan;
pub(crate) mod split;

/// Load the environment files and open the PostgreSQL backend.
pub(crate) async fn connect(env_file: Option<&Path>) -> anyhow::Result<StorageBackend> {
    load_env_files(env_file)?;
    let config = DatabaseConfig::from_env()?;
    let storage = StorageBackend::new_postgres(&config.url)
        .await
        .context("failed to connect to PostgreSQL")?;
    Ok(storage)
}
