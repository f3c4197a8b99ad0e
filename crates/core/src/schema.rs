//! Schema objects, DDL actions and migration steps.
//!
//! A [`MigrationStep`] pairs a human-readable name with one [`DdlAction`].
//! The action knows which [`SchemaObject`] it targets and whether it creates
//! or removes it, which is all an applier needs to decide between "apply" and
//! "already satisfied". SQL is rendered for PostgreSQL.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[allow(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").unwrap());

/// `TEXT`, `VARCHAR(255)`, `NUMERIC(10, 2)`, `DOUBLE PRECISION`, `INTEGER[]`.
#[allow(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static SQL_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*( [A-Za-z][A-Za-z0-9_]*)*(\(\d+(, ?\d+)?\))?(\[\])?$").unwrap()
});

/// A bare keyword, a numeric literal, a quoted string without `'` or `;`,
/// or a zero-argument function call such as `gen_random_uuid()`.
#[allow(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static DEFAULT_EXPR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*(\(\))?|-?\d+(\.\d+)?|'[^';]*')$").unwrap()
});

/// Reject names that would need quoting.
///
/// Step SQL is built by interpolation and PostgreSQL folds unquoted names to
/// lower case, so only lower-case names keep the catalog lookups in
/// `object_exists` matching the objects the DDL created.
pub fn validate_identifier(name: &str) -> Result<(), CoreError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(CoreError::InvalidIdentifier(name.to_owned()))
    }
}

pub(crate) fn validate_all<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<(), CoreError> {
    names.into_iter().try_for_each(validate_identifier)
}

/// A named object whose presence can be checked in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaObject {
    Table { name: String },
    Column { table: String, column: String },
    Constraint { table: String, name: String },
    Index { name: String },
    /// Present when the column exists and is declared `NOT NULL`.
    NotNull { table: String, column: String },
    Function { name: String },
}

impl fmt::Display for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table { name } => write!(f, "table {name}"),
            Self::Column { table, column } => write!(f, "column {table}.{column}"),
            Self::Constraint { table, name } => write!(f, "constraint {name} on {table}"),
            Self::Index { name } => write!(f, "index {name}"),
            Self::NotNull { table, column } => write!(f, "NOT NULL on {table}.{column}"),
            Self::Function { name } => write!(f, "function {name}()"),
        }
    }
}

/// Column-level foreign key (`REFERENCES table(column)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignRef {
    pub table: String,
    pub column: String,
    pub on_delete_cascade: bool,
}

/// Column definition used by `CREATE TABLE` and `ADD COLUMN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub default: Option<String>,
    pub references: Option<ForeignRef>,
}

impl ColumnDef {
    /// Nullable column with no constraints.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            unique: false,
            primary_key: false,
            default: None,
            references: None,
        }
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    #[must_use]
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references =
            Some(ForeignRef { table: table.into(), column: column.into(), on_delete_cascade: true });
        self
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if !self.nullable && !self.primary_key {
            sql.push_str(" NOT NULL");
        }
        if let Some(fk) = &self.references {
            sql.push_str(&format!(" REFERENCES {}({})", fk.table, fk.column));
            if fk.on_delete_cascade {
                sql.push_str(" ON DELETE CASCADE");
            }
        }
        sql
    }

    fn validate(&self) -> Result<(), CoreError> {
        validate_identifier(&self.name)?;
        if !SQL_TYPE.is_match(&self.sql_type) {
            return Err(CoreError::InvalidFormat(format!(
                "column {} has unsupported type {:?}",
                self.name, self.sql_type
            )));
        }
        if let Some(default) = self.default.as_deref().filter(|d| !DEFAULT_EXPR.is_match(d)) {
            return Err(CoreError::InvalidFormat(format!(
                "column {} has unsupported default {default:?}",
                self.name
            )));
        }
        if let Some(fk) = &self.references {
            validate_all([fk.table.as_str(), fk.column.as_str()])?;
        }
        Ok(())
    }
}

/// `CREATE TABLE` definition: columns plus table-level unique sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub unique: Vec<Vec<String>>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self { name: name.into(), columns, unique: Vec::new() }
    }

    #[must_use]
    pub fn unique_together(mut self, columns: &[&str]) -> Self {
        self.unique.push(columns.iter().map(|c| (*c).to_owned()).collect());
        self
    }
}

/// Table-level constraint body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintKind {
    Unique { columns: Vec<String> },
    ForeignKey { columns: Vec<String>, references: ForeignRef },
}

impl ConstraintKind {
    pub fn unique(columns: &[&str]) -> Self {
        Self::Unique { columns: columns.iter().map(|c| (*c).to_owned()).collect() }
    }

    fn to_sql(&self) -> String {
        match self {
            Self::Unique { columns } => format!("UNIQUE ({})", columns.join(", ")),
            Self::ForeignKey { columns, references } => {
                let mut sql = format!(
                    "FOREIGN KEY ({}) REFERENCES {}({})",
                    columns.join(", "),
                    references.table,
                    references.column
                );
                if references.on_delete_cascade {
                    sql.push_str(" ON DELETE CASCADE");
                }
                sql
            },
        }
    }
}

/// One schema-altering operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DdlAction {
    CreateTable(TableDef),
    DropTable { name: String, cascade: bool },
    AddColumn { table: String, column: ColumnDef },
    SetNotNull { table: String, column: String },
    DropNotNull { table: String, column: String },
    AddConstraint { table: String, name: String, kind: ConstraintKind },
    DropConstraint { table: String, name: String },
    CreateIndex { name: String, table: String, columns: Vec<String>, unique: bool },
    DropIndex { name: String },
    DropFunction { name: String },
}

impl DdlAction {
    /// The catalog object whose presence decides whether the action is needed.
    #[must_use]
    pub fn target(&self) -> SchemaObject {
        match self {
            Self::CreateTable(def) => SchemaObject::Table { name: def.name.clone() },
            Self::DropTable { name, .. } => SchemaObject::Table { name: name.clone() },
            Self::AddColumn { table, column } => {
                SchemaObject::Column { table: table.clone(), column: column.name.clone() }
            },
            Self::SetNotNull { table, column } | Self::DropNotNull { table, column } => {
                SchemaObject::NotNull { table: table.clone(), column: column.clone() }
            },
            Self::AddConstraint { table, name, .. } | Self::DropConstraint { table, name } => {
                SchemaObject::Constraint { table: table.clone(), name: name.clone() }
            },
            Self::CreateIndex { name, .. } | Self::DropIndex { name } => {
                SchemaObject::Index { name: name.clone() }
            },
            Self::DropFunction { name } => SchemaObject::Function { name: name.clone() },
        }
    }

    /// `true` when the action brings the target into existence, `false` when it removes it.
    #[must_use]
    pub const fn creates(&self) -> bool {
        matches!(
            self,
            Self::CreateTable(_)
                | Self::AddColumn { .. }
                | Self::SetNotNull { .. }
                | Self::AddConstraint { .. }
                | Self::CreateIndex { .. }
        )
    }

    /// Whether the action is already satisfied given the target's presence.
    #[must_use]
    pub const fn satisfied_by(&self, target_exists: bool) -> bool {
        target_exists == self.creates()
    }

    /// Check every identifier the action interpolates into SQL.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::CreateTable(def) => {
                validate_identifier(&def.name)?;
                if def.columns.is_empty() {
                    return Err(CoreError::InvalidFormat(format!(
                        "table {} has no columns",
                        def.name
                    )));
                }
                def.columns.iter().try_for_each(ColumnDef::validate)?;
                def.unique.iter().try_for_each(|set| validate_all(set.iter().map(String::as_str)))
            },
            Self::DropTable { name, .. } | Self::DropIndex { name } | Self::DropFunction { name } => {
                validate_identifier(name)
            },
            Self::AddColumn { table, column } => {
                validate_identifier(table)?;
                column.validate()
            },
            Self::SetNotNull { table, column } | Self::DropNotNull { table, column } => {
                validate_all([table.as_str(), column.as_str()])
            },
            Self::AddConstraint { table, name, kind } => {
                validate_all([table.as_str(), name.as_str()])?;
                match kind {
                    ConstraintKind::Unique { columns } => {
                        validate_non_empty(name, columns)?;
                        validate_all(columns.iter().map(String::as_str))
                    },
                    ConstraintKind::ForeignKey { columns, references } => {
                        validate_non_empty(name, columns)?;
                        validate_all(columns.iter().map(String::as_str))?;
                        validate_all([references.table.as_str(), references.column.as_str()])
                    },
                }
            },
            Self::DropConstraint { table, name } => validate_all([table.as_str(), name.as_str()]),
            Self::CreateIndex { name, table, columns, .. } => {
                validate_all([name.as_str(), table.as_str()])?;
                validate_non_empty(name, columns)?;
                validate_all(columns.iter().map(String::as_str))
            },
        }
    }

    /// Render the mutating statement. Call [`DdlAction::validate`] first.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::CreateTable(def) => {
                let mut parts: Vec<String> = def.columns.iter().map(ColumnDef::to_sql).collect();
                parts.extend(def.unique.iter().map(|set| format!("UNIQUE({})", set.join(", "))));
                format!("CREATE TABLE {} (\n    {}\n)", def.name, parts.join(",\n    "))
            },
            Self::DropTable { name, cascade } => {
                format!("DROP TABLE IF EXISTS {name}{}", if *cascade { " CASCADE" } else { "" })
            },
            Self::AddColumn { table, column } => {
                format!("ALTER TABLE {table} ADD COLUMN {}", column.to_sql())
            },
            Self::SetNotNull { table, column } => {
                format!("ALTER TABLE {table} ALTER COLUMN {column} SET NOT NULL")
            },
            Self::DropNotNull { table, column } => {
                format!("ALTER TABLE {table} ALTER COLUMN {column} DROP NOT NULL")
            },
            Self::AddConstraint { table, name, kind } => {
                format!("ALTER TABLE {table} ADD CONSTRAINT {name} {}", kind.to_sql())
            },
            Self::DropConstraint { table, name } => {
                format!("ALTER TABLE {table} DROP CONSTRAINT IF EXISTS {name}")
            },
            Self::CreateIndex { name, table, columns, unique } => format!(
                "CREATE {}INDEX {name} ON {table}({})",
                if *unique { "UNIQUE " } else { "" },
                columns.join(", ")
            ),
            Self::DropIndex { name } => format!("DROP INDEX IF EXISTS {name}"),
            Self::DropFunction { name } => format!("DROP FUNCTION IF EXISTS {name}() CASCADE"),
        }
    }
}

fn validate_non_empty(owner: &str, columns: &[String]) -> Result<(), CoreError> {
    if columns.is_empty() {
        return Err(CoreError::InvalidFormat(format!("{owner} lists no columns")));
    }
    Ok(())
}

/// An idempotent operation against one named schema object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub name: String,
    pub action: DdlAction,
}

impl MigrationStep {
    pub fn new(name: impl Into<String>, action: DdlAction) -> Self {
        Self { name: name.into(), action }
    }

    #[must_use]
    pub fn target(&self) -> SchemaObject {
        self.action.target()
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Result of applying one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Applied,
    AlreadySatisfied,
}

impl StepOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::AlreadySatisfied => "already satisfied",
        }
    }
}
