//! Shared constants for dbshift.
//!
//! Centralizes the numbers the named plans and the storage layer agree on.

/// PostgreSQL connection pool: maximum connections.
///
/// Migrations issue one statement at a time, so a single connection is enough.
pub const PG_POOL_MAX_CONNECTIONS: u32 = 1;

/// PostgreSQL connection pool: acquire timeout in seconds.
pub const PG_POOL_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// PostgreSQL connection pool: idle timeout in seconds.
pub const PG_POOL_IDLE_TIMEOUT_SECS: u64 = 300;

/// Number of digits in a generated user identifier.
pub const USER_ID_DIGITS: u32 = 10;

/// Random draws before the generator switches to the time-seeded fallback.
pub const DEFAULT_ID_MAX_ATTEMPTS: u32 = 100;

/// Linear probes the time-seeded fallback may make before giving up.
pub const DEFAULT_ID_FALLBACK_PROBES: u32 = 100;

/// Environment variable holding the connection string.
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

/// Environment override for [`DEFAULT_ID_MAX_ATTEMPTS`].
pub const ID_MAX_ATTEMPTS_VAR: &str = "DBSHIFT_ID_MAX_ATTEMPTS";

/// Environment override for [`DEFAULT_ID_FALLBACK_PROBES`].
pub const ID_FALLBACK_PROBES_VAR: &str = "DBSHIFT_ID_FALLBACK_PROBES";

/// Env files read (in order) when no explicit file is given.
pub const DEFAULT_ENV_FILES: &[&str] = &[".env.local", ".env"];
