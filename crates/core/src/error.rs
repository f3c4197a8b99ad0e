use std::io;

use thiserror::Error;

/// Errors raised by the pure domain layer (configuration, step validation).
#[derive(Error, Debug)]
pub enum CoreError {
    /// A mandatory configuration value is absent.
    #[error("configuration missing: {0} is not set")]
    ConfigurationMissing(&'static str),

    /// A schema identifier would have to be quoted or escaped to be used.
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    /// An identifier format or retry policy cannot be satisfied.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
