//! Typed error enum for the service layer.
//!
//! Distinguishes a failed existence check from a failed mutation so a run
//! aborts with the step that broke, and keeps identifier exhaustion separate
//! because it only fails its own backfill stage.

use dbshift_core::CoreError;
use dbshift_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A required setting (e.g. `DATABASE_URL`) is absent.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(&'static str),

    /// A step names an identifier or shape that must not reach SQL.
    #[error("invalid step {step}: {source}")]
    InvalidStep {
        step: String,
        #[source]
        source: CoreError,
    },

    /// The pre-check could not tell whether the target exists.
    #[error("existence check failed for {step}: {source}")]
    ExistenceCheckFailed {
        step: String,
        #[source]
        source: StorageError,
    },

    /// The store refused or failed the mutation.
    #[error("{step} failed: {source}")]
    MutationFailed {
        step: String,
        #[source]
        source: StorageError,
    },

    /// No free identifier within the retry budget.
    #[error("no free identifier for {target} after {attempts} attempts")]
    CollisionExhausted { target: String, attempts: u64 },

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("core: {0}")]
    Core(#[source] CoreError),
}

impl ServiceError {
    /// Name of the step the error is attributed to, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::InvalidStep { step, .. }
            | Self::ExistenceCheckFailed { step, .. }
            | Self::MutationFailed { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Whether only the current backfill stage is affected.
    pub fn is_collision_exhausted(&self) -> bool {
        matches!(self, Self::CollisionExhausted { .. })
    }

    /// Whether this error is likely transient (worth retrying).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ExistenceCheckFailed { source, .. }
            | Self::MutationFailed { source, .. }
            | Self::Storage(source) => source.is_transient(),
            _ => false,
        }
    }
}

impl From<CoreError> for ServiceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConfigurationMissing(var) => Self::ConfigurationMissing(var),
            other => Self::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configuration_is_lifted() {
        let err = ServiceError::from(CoreError::ConfigurationMissing("DATABASE_URL"));
        assert!(matches!(err, ServiceError::ConfigurationMissing("DATABASE_URL")));
        let err = ServiceError::from(CoreError::InvalidIdentifier("a b".to_owned()));
        assert!(matches!(err, ServiceError::Core(_)));
    }

    #[test]
    fn step_is_reported_for_step_errors() {
        let err = ServiceError::MutationFailed {
            step: "add users.user_id".to_owned(),
            source: StorageError::Rejected("nope".to_owned()),
        };
        assert_eq!(err.step(), Some("add users.user_id"));
        assert_eq!(err.to_string(), "add users.user_id failed: rejected: nope");
        assert!(!err.is_transient());
        assert!(!err.is_collision_exhausted());
    }
}
