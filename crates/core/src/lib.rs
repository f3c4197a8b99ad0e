//! Core types for dbshift
//!
//! Pure, storage-independent pieces of the migration engine: the statement
//! splitter, schema objects and DDL rendering, identifier formats, and the
//! specs and reports shared by the storage and service crates.

mod catalog;
pub mod constants;
mod denormalize;
mod duplicates;
mod env_config;
mod error;
mod identifier;
mod schema;
pub mod splitter;

pub use catalog::*;
pub use constants::*;
pub use denormalize::*;
pub use duplicates::*;
pub use env_config::*;
pub use error::*;
pub use identifier::*;
pub use schema::*;
pub use splitter::{SplitState, Statements, split_script, split_statements};
