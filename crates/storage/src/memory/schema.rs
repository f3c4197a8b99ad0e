use async_trait::async_trait;
use dbshift_core::{
    ColumnDef, ColumnInfo, ConstraintKind, DdlAction, ForeignKeyInfo, SchemaObject, TableDef,
    TableSummary,
};

use super::{MemConstraint, MemIndex, MemState, MemTable, MemoryStorage, key_of, not_found};
use crate::error::StorageError;
use crate::traits::SchemaStore;

fn already_exists(what: &str) -> StorageError {
    StorageError::AlreadyExists(format!("{what} already exists"))
}

impl MemState {
    fn object_exists(&self, object: &SchemaObject) -> bool {
        match object {
            SchemaObject::Table { name } => self.tables.contains_key(name),
            SchemaObject::Column { table, column } => {
                self.tables.get(table).is_some_and(|t| t.column(column).is_some())
            },
            SchemaObject::NotNull { table, column } => self
                .tables
                .get(table)
                .and_then(|t| t.column(column))
                .is_some_and(|c| !c.nullable),
            SchemaObject::Constraint { table, name } => {
                self.tables.get(table).is_some_and(|t| t.constraints.contains_key(name))
            },
            SchemaObject::Index { name } => self.indexes.contains_key(name),
            SchemaObject::Function { name } => self.functions.contains(name),
        }
    }

    /// Relation names share one namespace with index names.
    fn relation_taken(&self, name: &str) -> bool {
        self.tables.contains_key(name) || self.indexes.contains_key(name)
    }

    pub(super) fn require_columns(&self, table: &str, columns: &[String]) -> Result<(), StorageError> {
        let def = self.table(table)?;
        match columns.iter().find(|c| def.column(c).is_none()) {
            Some(missing) => Err(not_found("column", &format!("{table}.{missing}"))),
            None => Ok(()),
        }
    }

    fn require_unique_rows(&self, table: &str, name: &str, columns: &[String]) -> Result<(), StorageError> {
        let mut seen = std::collections::HashSet::new();
        let duplicated = self
            .table(table)?
            .rows
            .iter()
            .filter_map(|row| key_of(row, columns))
            .any(|key| !seen.insert(key));
        if duplicated {
            return Err(StorageError::Duplicate(format!(
                "could not create unique index \"{name}\": key is duplicated"
            )));
        }
        Ok(())
    }

    fn add_constraint(
        &mut self,
        table: &str,
        name: String,
        constraint: MemConstraint,
    ) -> Result<(), StorageError> {
        let unique_columns = match &constraint {
            MemConstraint::PrimaryKey { columns } | MemConstraint::Unique { columns } => {
                Some(columns.clone())
            },
            MemConstraint::ForeignKey { references, .. } => {
                self.require_columns(&references.table, std::slice::from_ref(&references.column))?;
                None
            },
        };
        let def = self.table(table)?;
        if def.constraints.contains_key(&name) {
            return Err(already_exists(&format!("constraint \"{name}\" for relation \"{table}\"")));
        }
        if let Some(columns) = unique_columns {
            if self.relation_taken(&name) {
                return Err(already_exists(&format!("relation \"{name}\"")));
            }
            self.require_unique_rows(table, &name, &columns)?;
            self.indexes
                .insert(name.clone(), MemIndex { table: table.to_owned(), columns, unique: true });
        }
        self.table_mut(table)?.constraints.insert(name, constraint);
        Ok(())
    }

    /// Constraints a column definition declares inline, with PostgreSQL's names.
    fn add_inline_constraints(&mut self, table: &str, column: &ColumnDef) -> Result<(), StorageError> {
        let columns = vec![column.name.clone()];
        if column.primary_key {
            self.add_constraint(
                table,
                format!("{table}_pkey"),
                MemConstraint::PrimaryKey { columns: columns.clone() },
            )?;
        }
        if column.unique {
            self.add_constraint(
                table,
                format!("{table}_{}_key", column.name),
                MemConstraint::Unique { columns: columns.clone() },
            )?;
        }
        if let Some(references) = &column.references {
            self.add_constraint(
                table,
                format!("{table}_{}_fkey", column.name),
                MemConstraint::ForeignKey { columns, references: references.clone() },
            )?;
        }
        Ok(())
    }

    fn create_table(&mut self, def: &TableDef) -> Result<(), StorageError> {
        if self.relation_taken(&def.name) {
            return Err(already_exists(&format!("relation \"{}\"", def.name)));
        }
        for column in &def.columns {
            if let Some(fk) = &column.references {
                if fk.table != def.name {
                    self.require_columns(&fk.table, std::slice::from_ref(&fk.column))?;
                }
            }
        }
        self.tables.insert(
            def.name.clone(),
            MemTable { columns: def.columns.clone(), ..MemTable::default() },
        );
        for column in &def.columns {
            self.add_inline_constraints(&def.name, column)?;
        }
        for set in &def.unique {
            self.add_constraint(
                &def.name,
                format!("{}_{}_key", def.name, set.join("_")),
                MemConstraint::Unique { columns: set.clone() },
            )?;
        }
        Ok(())
    }

    fn drop_table(&mut self, name: &str, cascade: bool) -> Result<(), StorageError> {
        if !self.tables.contains_key(name) {
            return Ok(());
        }
        let referencing: Vec<(String, String)> = self
            .tables
            .iter()
            .filter(|(table, _)| table.as_str() != name)
            .flat_map(|(table, def)| {
                def.constraints.iter().filter_map(move |(cname, c)| match c {
                    MemConstraint::ForeignKey { references, .. } if references.table == name => {
                        Some((table.clone(), cname.clone()))
                    },
                    _ => None,
                })
            })
            .collect();
        if !referencing.is_empty() && !cascade {
            return Err(StorageError::Rejected(format!(
                "cannot drop table {name} because other objects depend on it"
            )));
        }
        for (table, constraint) in referencing {
            if let Some(def) = self.tables.get_mut(&table) {
                def.constraints.remove(&constraint);
            }
        }
        self.indexes.retain(|_, idx| idx.table != name);
        self.tables.remove(name);
        Ok(())
    }

    fn add_column(&mut self, table: &str, column: &ColumnDef) -> Result<(), StorageError> {
        let def = self.table(table)?;
        if def.column(&column.name).is_some() {
            return Err(already_exists(&format!(
                "column \"{}\" of relation \"{table}\"",
                column.name
            )));
        }
        if !column.nullable && column.default.is_none() && !def.rows.is_empty() {
            return Err(StorageError::Rejected(format!(
                "column \"{}\" of relation \"{table}\" contains null values",
                column.name
            )));
        }
        let def = self.table_mut(table)?;
        def.columns.push(column.clone());
        for row in &mut def.rows {
            row.insert(column.name.clone(), column.default.clone());
        }
        self.add_inline_constraints(table, column)
    }

    fn set_nullable(&mut self, table: &str, column: &str, nullable: bool) -> Result<(), StorageError> {
        let def = self.table(table)?;
        let Some(col) = def.column(column) else {
            return Err(not_found("column", &format!("{table}.{column}")));
        };
        if !nullable && def.rows.iter().any(|r| super::value(r, column).is_none()) {
            return Err(StorageError::Rejected(format!(
                "column \"{column}\" of relation \"{table}\" contains null values"
            )));
        }
        if nullable && col.primary_key {
            return Err(StorageError::Rejected(format!("column \"{column}\" is in a primary key")));
        }
        if let Some(col) = self.table_mut(table)?.column_mut(column) {
            col.nullable = nullable;
        }
        Ok(())
    }

    fn drop_constraint(&mut self, table: &str, name: &str) -> Result<(), StorageError> {
        let removed = self.table_mut(table)?.constraints.remove(name);
        if matches!(removed, Some(MemConstraint::PrimaryKey { .. } | MemConstraint::Unique { .. })) {
            self.indexes.remove(name);
        }
        Ok(())
    }

    fn create_index(
        &mut self,
        name: &str,
        table: &str,
        columns: &[String],
        unique: bool,
    ) -> Result<(), StorageError> {
        if self.relation_taken(name) {
            return Err(already_exists(&format!("relation \"{name}\"")));
        }
        self.require_columns(table, columns)?;
        if unique {
            self.require_unique_rows(table, name, columns)?;
        }
        self.indexes.insert(
            name.to_owned(),
            MemIndex { table: table.to_owned(), columns: columns.to_vec(), unique },
        );
        Ok(())
    }

    fn drop_index(&mut self, name: &str) -> Result<(), StorageError> {
        let Some(index) = self.indexes.get(name) else {
            return Ok(());
        };
        if self.tables.get(&index.table).is_some_and(|t| t.constraints.contains_key(name)) {
            return Err(StorageError::Rejected(format!(
                "cannot drop index {name} because constraint {name} requires it"
            )));
        }
        self.indexes.remove(name);
        Ok(())
    }

    fn apply(&mut self, action: &DdlAction) -> Result<(), StorageError> {
        match action {
            DdlAction::CreateTable(def) => self.create_table(def),
            DdlAction::DropTable { name, cascade } => self.drop_table(name, *cascade),
            DdlAction::AddColumn { table, column } => self.add_column(table, column),
            DdlAction::SetNotNull { table, column } => self.set_nullable(table, column, false),
            DdlAction::DropNotNull { table, column } => self.set_nullable(table, column, true),
            DdlAction::AddConstraint { table, name, kind } => {
                let constraint = match kind {
                    ConstraintKind::Unique { columns } => {
                        self.require_columns(table, columns)?;
                        MemConstraint::Unique { columns: columns.clone() }
                    },
                    ConstraintKind::ForeignKey { columns, references } => {
                        self.require_columns(table, columns)?;
                        MemConstraint::ForeignKey {
                            columns: columns.clone(),
                            references: references.clone(),
                        }
                    },
                };
                self.add_constraint(table, name.clone(), constraint)
            },
            DdlAction::DropConstraint { table, name } => self.drop_constraint(table, name),
            DdlAction::CreateIndex { name, table, columns, unique } => {
                self.create_index(name, table, columns, *unique)
            },
            DdlAction::DropIndex { name } => self.drop_index(name),
            DdlAction::DropFunction { name } => {
                self.functions.remove(name);
                Ok(())
            },
        }
    }

    fn summary(&self, name: &str, table: &MemTable) -> TableSummary {
        TableSummary {
            name: name.to_owned(),
            columns: table
                .columns
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name.clone(),
                    data_type: c.sql_type.to_lowercase(),
                    max_length: None,
                    nullable: c.nullable,
                    default: c.default.clone(),
                })
                .collect(),
            indexes: self
                .indexes
                .iter()
                .filter(|(_, idx)| idx.table == name)
                .map(|(n, _)| n.clone())
                .collect(),
            foreign_keys: table
                .constraints
                .iter()
                .filter_map(|(cname, c)| match c {
                    MemConstraint::ForeignKey { columns, references } => Some(ForeignKeyInfo {
                        name: cname.clone(),
                        column: columns.join(", "),
                        foreign_table: references.table.clone(),
                        foreign_column: references.column.clone(),
                    }),
                    _ => None,
                })
                .collect(),
            row_count: i64::try_from(table.rows.len()).unwrap_or(i64::MAX),
        }
    }
}

fn injected_failure() -> StorageError {
    StorageError::Database(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl SchemaStore for MemoryStorage {
    async fn object_exists(&self, object: &SchemaObject) -> Result<bool, StorageError> {
        let state = self.state();
        if state.failing_existence_checks {
            return Err(injected_failure());
        }
        if state.stale_catalog {
            return Ok(false);
        }
        Ok(state.object_exists(object))
    }

    async fn apply_ddl(&self, action: &DdlAction) -> Result<(), StorageError> {
        tracing::debug!(sql = %action.to_sql(), "applying DDL in memory");
        self.state().apply(action)
    }

    async fn execute_statement(&self, sql: &str) -> Result<u64, StorageError> {
        let mut state = self.state();
        if state.failing_statements.iter().any(|f| sql.contains(f.as_str())) {
            return Err(StorageError::Database(sqlx::Error::Protocol(format!(
                "injected failure executing: {sql}"
            ))));
        }
        state.executed.push(sql.to_owned());
        Ok(0)
    }

    async fn describe_tables(&self) -> Result<Vec<TableSummary>, StorageError> {
        let state = self.state();
        Ok(state.tables.iter().map(|(name, table)| state.summary(name, table)).collect())
    }

    async fn ping(&self) -> Result<String, StorageError> {
        Ok("in-memory".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use dbshift_core::ForeignRef;

    use super::*;

    fn users() -> DdlAction {
        DdlAction::CreateTable(TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", "SERIAL").primary_key(),
                ColumnDef::new("email", "VARCHAR(255)").not_null().unique(),
                ColumnDef::new("username", "VARCHAR(50)"),
            ],
        ))
    }

    fn user_email_key() -> SchemaObject {
        SchemaObject::Constraint { table: "users".to_owned(), name: "users_email_key".to_owned() }
    }

    #[tokio::test]
    async fn create_table_registers_implicit_constraints() {
        let store = MemoryStorage::new();
        store.apply_ddl(&users()).await.unwrap();
        assert!(store.object_exists(&user_email_key()).await.unwrap());
        assert!(store.has_constraint("users", "users_pkey"));
        assert!(store.has_index("users_email_key"));
        assert!(matches!(
            store.apply_ddl(&users()).await,
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn set_not_null_requires_populated_column() {
        let store = MemoryStorage::new();
        store.apply_ddl(&users()).await.unwrap();
        store.insert_row("users", &[("id", Some("1")), ("email", Some("a@x"))]).unwrap();
        let action =
            DdlAction::SetNotNull { table: "users".to_owned(), column: "username".to_owned() };
        assert!(matches!(store.apply_ddl(&action).await, Err(StorageError::Rejected(_))));
        assert_eq!(store.column_nullable("users", "username"), Some(true));
    }

    #[tokio::test]
    async fn add_unique_constraint_rejects_duplicated_rows() {
        let store = MemoryStorage::new();
        store.apply_ddl(&users()).await.unwrap();
        for (id, email) in [("1", "a@x"), ("2", "b@x")] {
            store
                .insert_row("users", &[("id", Some(id)), ("email", Some(email)), ("username", Some("u"))])
                .unwrap();
        }
        let action = DdlAction::AddConstraint {
            table: "users".to_owned(),
            name: "users_username_unique".to_owned(),
            kind: ConstraintKind::unique(&["username"]),
        };
        assert!(store.apply_ddl(&action).await.unwrap_err().is_duplicate());
    }

    #[tokio::test]
    async fn unique_sets_treat_nulls_as_distinct() {
        let store = MemoryStorage::new();
        store.apply_ddl(&users()).await.unwrap();
        store.insert_row("users", &[("id", Some("1")), ("email", Some("a@x"))]).unwrap();
        store.insert_row("users", &[("id", Some("2")), ("email", Some("b@x"))]).unwrap();
        let action = DdlAction::CreateIndex {
            name: "idx_users_username".to_owned(),
            table: "users".to_owned(),
            columns: vec!["username".to_owned()],
            unique: true,
        };
        store.apply_ddl(&action).await.unwrap();
        let dup = store.insert_row("users", &[("id", Some("3")), ("email", Some("a@x"))]);
        assert!(dup.unwrap_err().is_duplicate());
    }

    #[tokio::test]
    async fn drop_referenced_table_needs_cascade() {
        let store = MemoryStorage::new();
        store.apply_ddl(&users()).await.unwrap();
        let accounts = DdlAction::CreateTable(TableDef::new(
            "accounts",
            vec![
                ColumnDef::new("id", "SERIAL").primary_key(),
                ColumnDef::new("user_id", "INTEGER").not_null().references("users", "id"),
            ],
        ));
        store.apply_ddl(&accounts).await.unwrap();
        assert!(store.has_constraint("accounts", "accounts_user_id_fkey"));

        let plain = DdlAction::DropTable { name: "users".to_owned(), cascade: false };
        assert!(matches!(store.apply_ddl(&plain).await, Err(StorageError::Rejected(_))));

        let cascade = DdlAction::DropTable { name: "users".to_owned(), cascade: true };
        store.apply_ddl(&cascade).await.unwrap();
        assert!(!store.has_table("users"));
        assert!(!store.has_index("users_email_key"));
        assert!(!store.has_constraint("accounts", "accounts_user_id_fkey"));
    }

    #[tokio::test]
    async fn drops_of_absent_objects_succeed() {
        let store = MemoryStorage::new();
        store.apply_ddl(&users()).await.unwrap();
        for action in [
            DdlAction::DropTable { name: "posts".to_owned(), cascade: true },
            DdlAction::DropIndex { name: "idx_nope".to_owned() },
            DdlAction::DropFunction { name: "update_updated_at_column".to_owned() },
            DdlAction::DropConstraint { table: "users".to_owned(), name: "nope".to_owned() },
        ] {
            store.apply_ddl(&action).await.unwrap();
        }
    }

    #[tokio::test]
    async fn foreign_key_constraint_requires_referenced_column() {
        let store = MemoryStorage::new();
        store.apply_ddl(&users()).await.unwrap();
        let action = DdlAction::AddConstraint {
            table: "users".to_owned(),
            name: "users_team_fkey".to_owned(),
            kind: ConstraintKind::ForeignKey {
                columns: vec!["username".to_owned()],
                references: ForeignRef {
                    table: "teams".to_owned(),
                    column: "name".to_owned(),
                    on_delete_cascade: false,
                },
            },
        };
        assert!(matches!(store.apply_ddl(&action).await, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn injected_failures_surface_as_database_errors() {
        let store = MemoryStorage::new();
        store.set_failing_existence_checks(true);
        assert!(store.object_exists(&user_email_key()).await.unwrap_err().is_transient());

        store.fail_statements_containing("posts");
        assert!(store.execute_statement("CREATE TABLE posts (id INT)").await.is_err());
        store.execute_statement("SELECT 1").await.unwrap();
        assert_eq!(store.executed_statements(), vec!["SELECT 1".to_owned()]);
    }

    #[tokio::test]
    async fn stale_catalog_reports_absent() {
        let store = MemoryStorage::new();
        store.apply_ddl(&users()).await.unwrap();
        store.set_stale_catalog(true);
        assert!(!store.object_exists(&user_email_key()).await.unwrap());
    }

    #[tokio::test]
    async fn describe_tables_lists_structure() {
        let store = MemoryStorage::new();
        store.apply_ddl(&users()).await.unwrap();
        store.insert_row("users", &[("id", Some("1")), ("email", Some("a@x"))]).unwrap();
        let tables = store.describe_tables().await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].row_count, 1);
        assert_eq!(tables[0].columns[1].data_type, "varchar(255)");
        assert_eq!(tables[0].indexes, vec!["users_email_key".to_owned(), "users_pkey".to_owned()]);
    }
}
