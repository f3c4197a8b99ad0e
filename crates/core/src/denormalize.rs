//! Child-to-parent denormalization: copying one representative child row
//! onto its parent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::schema::validate_all;

/// A `(child column, parent column)` copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub child: String,
    pub parent: String,
}

/// Describes how a one-to-many child table folds into columns on its parent.
///
/// A parent "lacks" the denormalized fields when every mapped parent column is
/// NULL. For each such parent the first child row in `order_by` order wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenormalizeSpec {
    pub parent_table: String,
    pub parent_key: String,
    pub child_table: String,
    pub child_foreign_key: String,
    pub fields: Vec<FieldMapping>,
    pub order_by: Vec<String>,
}

impl DenormalizeSpec {
    pub fn new(
        parent_table: impl Into<String>,
        parent_key: impl Into<String>,
        child_table: impl Into<String>,
        child_foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            parent_table: parent_table.into(),
            parent_key: parent_key.into(),
            child_table: child_table.into(),
            child_foreign_key: child_foreign_key.into(),
            fields: Vec::new(),
            order_by: Vec::new(),
        }
    }

    /// Copy `child` into `parent`; a same-named column on both sides is common.
    #[must_use]
    pub fn field(mut self, child: &str, parent: &str) -> Self {
        self.fields.push(FieldMapping { child: child.to_owned(), parent: parent.to_owned() });
        self
    }

    #[must_use]
    pub fn tie_break(mut self, columns: &[&str]) -> Self {
        self.order_by.extend(columns.iter().map(|c| (*c).to_owned()));
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_all([
            self.parent_table.as_str(),
            self.parent_key.as_str(),
            self.child_table.as_str(),
            self.child_foreign_key.as_str(),
        ])?;
        if self.fields.is_empty() {
            return Err(CoreError::InvalidFormat(format!("{self} maps no fields")));
        }
        validate_all(self.fields.iter().flat_map(|f| [f.child.as_str(), f.parent.as_str()]))?;
        validate_all(self.order_by.iter().map(String::as_str))
    }

    pub fn child_columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.child.as_str())
    }

    pub fn parent_columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.parent.as_str())
    }
}

impl fmt::Display for DenormalizeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.child_table, self.parent_table)
    }
}

/// The child row chosen for one parent; `values` follow `DenormalizeSpec::fields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSelection {
    pub parent_key: String,
    pub values: Vec<Option<String>>,
}

/// Outcome of one migrator pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenormalizeReport {
    /// Parents whose fields were written in this pass, in key order.
    pub migrated: Vec<String>,
    /// Parents still lacking fields afterwards (they have no child rows).
    pub unmigrated: Vec<String>,
    /// The child table was already gone, so there was nothing to read.
    pub source_missing: bool,
}
