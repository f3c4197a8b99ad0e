//! In-memory storage backend.
//!
//! Models just enough of a PostgreSQL catalog to drive migration plans in
//! tests: tables with rows, implicitly named constraints, indexes and
//! functions. DDL follows PostgreSQL's rules for the cases plans rely on
//! (NOT NULL needs a fully populated column, unique sets treat NULLs as
//! distinct, dropping a referenced table needs `CASCADE`). Raw script
//! statements are recorded, not interpreted.

mod rows;
mod schema;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dbshift_core::{ColumnDef, ForeignRef};

use crate::error::StorageError;

type Row = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum MemConstraint {
    PrimaryKey { columns: Vec<String> },
    Unique { columns: Vec<String> },
    ForeignKey { columns: Vec<String>, references: ForeignRef },
}

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<ColumnDef>,
    constraints: BTreeMap<String, MemConstraint>,
    rows: Vec<Row>,
}

impl MemTable {
    fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDef> {
        self.columns.iter_mut().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MemIndex {
    table: String,
    columns: Vec<String>,
    unique: bool,
}

#[derive(Debug, Default)]
struct MemState {
    tables: BTreeMap<String, MemTable>,
    indexes: BTreeMap<String, MemIndex>,
    functions: BTreeSet<String>,
    executed: Vec<String>,
    stale_catalog: bool,
    failing_existence_checks: bool,
    failing_statements: Vec<String>,
}

impl MemState {
    fn table(&self, name: &str) -> Result<&MemTable, StorageError> {
        self.tables.get(name).ok_or_else(|| not_found("table", name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, StorageError> {
        self.tables.get_mut(name).ok_or_else(|| not_found("table", name))
    }

    /// First unique index on `table` that `candidate` would collide with,
    /// ignoring the row at `skip`. NULLs never collide.
    fn unique_conflict(&self, table: &str, candidate: &Row, skip: Option<usize>) -> Option<String> {
        let rows = &self.tables.get(table)?.rows;
        self.indexes
            .iter()
            .filter(|(_, idx)| idx.unique && idx.table == table)
            .find(|(_, idx)| {
                let Some(key) = key_of(candidate, &idx.columns) else {
                    return false;
                };
                rows.iter()
                    .enumerate()
                    .filter(|(i, _)| Some(*i) != skip)
                    .any(|(_, row)| key_of(row, &idx.columns).as_ref() == Some(&key))
            })
            .map(|(name, _)| name.clone())
    }

    fn check_not_null(&self, table: &str, row: &Row) -> Result<(), StorageError> {
        let def = self.table(table)?;
        match def.columns.iter().find(|c| !c.nullable && value(row, &c.name).is_none()) {
            Some(col) => Err(StorageError::Rejected(format!(
                "null value in column \"{}\" of relation \"{table}\" violates not-null constraint",
                col.name
            ))),
            None => Ok(()),
        }
    }
}

/// Values of `columns` in `row`, or `None` when any of them is NULL.
fn key_of(row: &Row, columns: &[String]) -> Option<Vec<String>> {
    columns.iter().map(|c| value(row, c).map(str::to_owned)).collect()
}

fn value<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|v| v.as_deref())
}

fn not_found(entity: &'static str, id: &str) -> StorageError {
    StorageError::NotFound { entity, id: id.to_owned() }
}

/// Key ordering matching PostgreSQL for integer and text keys.
fn key_cmp(a: &str, b: &str) -> Ordering {
    match (a.parse::<i128>(), b.parse::<i128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

/// `ORDER BY ... ASC` with NULLs last.
fn nulls_last(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => key_cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Comparable snapshot of everything DDL can change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaShape {
    pub tables: BTreeMap<String, Vec<(String, String, bool)>>,
    pub constraints: BTreeSet<String>,
    pub indexes: BTreeSet<String>,
    pub functions: BTreeSet<String>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert one row. Unlisted columns take their default, or NULL.
    pub fn insert_row(&self, table: &str, values: &[(&str, Option<&str>)]) -> Result<(), StorageError> {
        let mut state = self.state();
        let def = state.table(table)?;
        let mut row = Row::new();
        for col in &def.columns {
            row.insert(col.name.clone(), col.default.clone());
        }
        for (name, v) in values {
            if def.column(name).is_none() {
                return Err(not_found("column", &format!("{table}.{name}")));
            }
            row.insert((*name).to_owned(), v.map(str::to_owned));
        }
        state.check_not_null(table, &row)?;
        if let Some(index) = state.unique_conflict(table, &row, None) {
            return Err(StorageError::Duplicate(format!(
                "duplicate key value violates unique constraint \"{index}\""
            )));
        }
        state.table_mut(table)?.rows.push(row);
        Ok(())
    }

    /// All rows of `table` in insertion order.
    pub fn rows(&self, table: &str) -> Vec<BTreeMap<String, Option<String>>> {
        self.state().tables.get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    pub fn column_values(&self, table: &str, column: &str) -> Vec<Option<String>> {
        self.rows(table).into_iter().map(|mut r| r.remove(column).flatten()).collect()
    }

    pub fn column_nullable(&self, table: &str, column: &str) -> Option<bool> {
        self.state().tables.get(table)?.column(column).map(|c| c.nullable)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state().tables.contains_key(table)
    }

    pub fn has_constraint(&self, table: &str, name: &str) -> bool {
        self.state().tables.get(table).is_some_and(|t| t.constraints.contains_key(name))
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.state().indexes.contains_key(name)
    }

    pub fn add_function(&self, name: &str) {
        self.state().functions.insert(name.to_owned());
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.state().functions.contains(name)
    }

    /// Raw statements passed to `execute_statement`, in order.
    pub fn executed_statements(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Make every existence check report "absent", as a stale catalog would.
    pub fn set_stale_catalog(&self, stale: bool) {
        self.state().stale_catalog = stale;
    }

    /// Make every existence check fail with a connection-level error.
    pub fn set_failing_existence_checks(&self, failing: bool) {
        self.state().failing_existence_checks = failing;
    }

    /// Fail any raw statement containing `fragment`.
    pub fn fail_statements_containing(&self, fragment: &str) {
        self.state().failing_statements.push(fragment.to_owned());
    }

    pub fn schema_shape(&self) -> SchemaShape {
        let state = self.state();
        SchemaShape {
            tables: state
                .tables
                .iter()
                .map(|(name, t)| {
                    let cols = t
                        .columns
                        .iter()
                        .map(|c| (c.name.clone(), c.sql_type.clone(), c.nullable))
                        .collect();
                    (name.clone(), cols)
                })
                .collect(),
            constraints: state
                .tables
                .iter()
                .flat_map(|(name, t)| t.constraints.keys().map(move |c| format!("{name}.{c}")))
                .collect(),
            indexes: state.indexes.keys().cloned().collect(),
            functions: state.functions.clone(),
        }
    }
}
