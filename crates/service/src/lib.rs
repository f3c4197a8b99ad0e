//! Service layer for dbshift
//!
//! The migration engine: idempotent DDL, identifier backfills, child-to-parent
//! denormalization, duplicate detection and the plans that chain them.

#![allow(missing_docs, reason = "Internal crate with self-explanatory API")]
#![allow(clippy::missing_errors_doc, reason = "Errors are self-explanatory from Result types")]
#![allow(missing_debug_implementations, reason = "Internal types")]

mod applier;
mod detector;
pub mod error;
mod identifier;
mod migrator;
mod pipeline;
pub mod plans;
mod script_runner;

pub use applier::DdlApplier;
pub use detector::DuplicateDetector;
pub use error::ServiceError;
pub use identifier::IdentifierGenerator;
pub use migrator::DataMigrator;
pub use pipeline::{
    Pipeline, Plan, RunAborted, RunReport, RunStatus, Stage, StageRecord, StageResult,
};
pub use script_runner::ScriptRunner;
