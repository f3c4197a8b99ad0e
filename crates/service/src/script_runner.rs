use std::sync::Arc;

use dbshift_core::split_script;
use dbshift_storage::StorageBackend;
use dbshift_storage::traits::SchemaStore;

use crate::error::ServiceError;

/// Executes a multi-statement SQL script one statement at a time.
pub struct ScriptRunner {
    storage: Arc<StorageBackend>,
}

impl ScriptRunner {
    #[must_use]
    pub const fn new(storage: Arc<StorageBackend>) -> Self {
        Self { storage }
    }

    /// Split `script` and run it. Returns the number of statements executed.
    pub async fn run(&self, label: &str, script: &str) -> Result<usize, ServiceError> {
        self.run_statements(label, &split_script(script)).await
    }

    pub async fn run_statements(
        &self,
        label: &str,
        statements: &[String],
    ) -> Result<usize, ServiceError> {
        let total = statements.len();
        for (i, statement) in statements.iter().enumerate() {
            let step = format!("{label} statement {}/{total}", i + 1);
            let rows = self
                .storage
                .execute_statement(statement)
                .await
                .map_err(|source| ServiceError::MutationFailed { step: step.clone(), source })?;
            tracing::debug!(step = %step, rows, "executed");
        }
        tracing::info!(label, statements = total, "script complete");
        Ok(total)
    }
}
