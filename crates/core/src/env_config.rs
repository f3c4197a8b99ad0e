//! Environment-driven configuration.
//!
//! The only mandatory input is the connection string; everything else has a
//! default and may be overridden through the environment.

use std::path::Path;

use crate::constants::{
    DATABASE_URL_VAR, DEFAULT_ENV_FILES, DEFAULT_ID_FALLBACK_PROBES, DEFAULT_ID_MAX_ATTEMPTS,
    ID_FALLBACK_PROBES_VAR, ID_MAX_ATTEMPTS_VAR,
};
use crate::error::CoreError;
use crate::identifier::RetryPolicy;

/// Parse an environment variable with a default fallback.
///
/// - If the variable is not set: returns `default` silently (expected case).
/// - If the variable is set but cannot be parsed: logs a warning and returns `default`.
pub fn env_parse_with_default<T: std::str::FromStr + std::fmt::Display>(
    var: &str,
    default: T,
) -> T {
    match std::env::var(var) {
        Ok(v) => match v.parse() {
            Ok(n) => n,
            Err(_) => {
                tracing::warn!(
                    var,
                    value = %v,
                    default = %default,
                    "invalid env var value, using default"
                );
                default
            },
        },
        Err(_) => default,
    }
}

/// Load env files into the process environment.
///
/// With an explicit path the file must exist. Without one, `.env.local` and
/// `.env` are tried in order and silently skipped when absent. Variables that
/// are already set are never overwritten.
pub fn load_env_files(explicit: Option<&Path>) -> Result<(), CoreError> {
    if let Some(path) = explicit {
        dotenvy::from_path(path).map_err(|e| match e {
            dotenvy::Error::Io(io) => CoreError::Io(io),
            other => CoreError::InvalidFormat(format!("{}: {other}", path.display())),
        })?;
        tracing::debug!(path = %path.display(), "loaded env file");
        return Ok(());
    }
    for name in DEFAULT_ENV_FILES {
        match dotenvy::from_filename(name) {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded env file"),
            Err(e) if e.not_found() => {},
            Err(e) => {
                return Err(CoreError::InvalidFormat(format!("{name}: {e}")));
            },
        }
    }
    Ok(())
}

/// Connection settings for a migration run.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl DatabaseConfig {
    /// Read `DATABASE_URL`; a missing or blank value is a configuration error.
    pub fn from_env() -> Result<Self, CoreError> {
        match std::env::var(DATABASE_URL_VAR) {
            Ok(url) if !url.trim().is_empty() => Ok(Self { url }),
            _ => Err(CoreError::ConfigurationMissing(DATABASE_URL_VAR)),
        }
    }
}

// Never print the connection string; it carries credentials.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig").field("url", &"[redacted]").finish()
    }
}

/// Identifier retry policy with environment overrides applied.
#[must_use]
pub fn retry_policy_from_env() -> RetryPolicy {
    RetryPolicy::new(
        env_parse_with_default(ID_MAX_ATTEMPTS_VAR, DEFAULT_ID_MAX_ATTEMPTS),
        env_parse_with_default(ID_FALLBACK_PROBES_VAR, DEFAULT_ID_FALLBACK_PROBES),
    )
}
