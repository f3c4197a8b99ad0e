//! Read-only description of the live schema, used by `dbshift inspect`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub max_length: Option<i32>,
    pub nullable: bool,
    pub default: Option<String>,
}

impl ColumnInfo {
    /// `character varying(255)` style rendering.
    #[must_use]
    pub fn display_type(&self) -> String {
        match self.max_length {
            Some(len) => format!("{}({len})", self.data_type),
            None => self.data_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub name: String,
    pub column: String,
    pub foreign_table: String,
    pub foreign_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub row_count: i64,
}
