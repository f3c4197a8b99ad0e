//! Typed error enum for the storage layer.
//!
//! Failures are classified by SQLSTATE so callers can tell "this object
//! already exists" and "unique value taken" apart from real breakage without
//! matching on driver message text.

use thiserror::Error;

/// SQLSTATE 23505 `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE codes meaning "the object you are creating is already there":
/// 42710 `duplicate_object`, 42P07 `duplicate_table`, 42701 `duplicate_column`.
const ALREADY_EXISTS: [&str; 3] = ["42710", "42P07", "42701"];

/// Storage-layer error with variants covering every expected failure mode.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Row or relation not found for an expected-present entity.
    #[error("not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint violation on a row write.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// DDL tried to create an object that already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// SQL / connection / timeout failure.
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Row data could not be decoded.
    #[error("data corruption: {context}")]
    DataCorruption {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The in-memory backend refused an operation PostgreSQL would also refuse.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl StorageError {
    /// Whether this error is likely transient (worth retrying).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)))
    }

    /// Whether this error is a unique-constraint violation.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    /// Whether DDL failed only because its object is already present.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Custom `From<sqlx::Error>`, not a blanket `#[from]`.
///
/// - `RowNotFound` → `NotFound` (generic; callers should remap with entity context)
/// - `ColumnDecode` → `DataCorruption`
/// - SQLSTATE 23505 → `Duplicate`
/// - SQLSTATE 42710 / 42P07 / 42701 → `AlreadyExists`
/// - Everything else → `Database`
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        let code = match &err {
            sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
            _ => None,
        };
        match (err, code.as_deref()) {
            (sqlx::Error::RowNotFound, _) => Self::NotFound { entity: "row", id: "unknown".into() },
            (sqlx::Error::ColumnDecode { index, source }, _) => {
                Self::DataCorruption { context: format!("undecodable column {index}"), source }
            },
            (sqlx::Error::Database(db_err), Some(UNIQUE_VIOLATION)) => {
                Self::Duplicate(db_err.message().to_owned())
            },
            (sqlx::Error::Database(db_err), Some(code)) if ALREADY_EXISTS.contains(&code) => {
                Self::AlreadyExists(db_err.message().to_owned())
            },
            (other, _) => Self::Database(other),
        }
    }
}
