use async_trait::async_trait;
use dbshift_core::{
    ChildSelection, DenormalizeSpec, DuplicateGroup, DuplicateMember, IdentifierTarget,
    NaturalKeySpec, group_rows,
};

use super::{MemState, MemoryStorage, Row, key_cmp, not_found, nulls_last, value};
use crate::error::StorageError;
use crate::traits::{DenormalizeStore, DuplicateStore, IdentifierStore};

fn lacks_all(row: &Row, spec: &DenormalizeSpec) -> bool {
    spec.parent_columns().all(|c| value(row, c).is_none())
}

impl MemState {
    fn require_column(&self, table: &str, column: &str) -> Result<(), StorageError> {
        self.require_columns(table, &[column.to_owned()])
    }

    /// Write `updates` onto row `index` of `table` unless a unique index objects.
    fn update_row(
        &mut self,
        table: &str,
        index: usize,
        updates: &[(&str, Option<String>)],
    ) -> Result<(), StorageError> {
        let mut candidate = self.table(table)?.rows[index].clone();
        for (column, v) in updates {
            candidate.insert((*column).to_owned(), v.clone());
        }
        self.check_not_null(table, &candidate)?;
        if let Some(conflict) = self.unique_conflict(table, &candidate, Some(index)) {
            return Err(StorageError::Duplicate(format!(
                "duplicate key value violates unique constraint \"{conflict}\""
            )));
        }
        self.table_mut(table)?.rows[index] = candidate;
        Ok(())
    }

    fn sorted_keys<'a>(&self, keys: impl Iterator<Item = &'a str>) -> Vec<String> {
        let mut keys: Vec<String> = keys.map(str::to_owned).collect();
        keys.sort_by(|a, b| key_cmp(a, b));
        keys
    }
}

#[async_trait]
impl IdentifierStore for MemoryStorage {
    async fn identifier_exists(
        &self,
        target: &IdentifierTarget,
        candidate: &str,
    ) -> Result<bool, StorageError> {
        let state = self.state();
        state.require_column(&target.table, &target.column)?;
        let rows = &state.table(&target.table)?.rows;
        Ok(rows.iter().any(|r| value(r, &target.column) == Some(candidate)))
    }

    async fn rows_missing_identifier(
        &self,
        target: &IdentifierTarget,
    ) -> Result<Vec<String>, StorageError> {
        let state = self.state();
        state.require_column(&target.table, &target.column)?;
        let rows = &state.table(&target.table)?.rows;
        Ok(state.sorted_keys(
            rows.iter()
                .filter(|r| value(r, &target.column).is_none())
                .filter_map(|r| value(r, &target.key_column)),
        ))
    }

    async fn assign_identifier(
        &self,
        target: &IdentifierTarget,
        row_key: &str,
        candidate: &str,
    ) -> Result<bool, StorageError> {
        let mut state = self.state();
        state.require_column(&target.table, &target.column)?;
        let position = state.table(&target.table)?.rows.iter().position(|r| {
            value(r, &target.key_column) == Some(row_key) && value(r, &target.column).is_none()
        });
        let Some(index) = position else {
            return Ok(false);
        };
        let update = [(target.column.as_str(), Some(candidate.to_owned()))];
        state.update_row(&target.table, index, &update)?;
        Ok(true)
    }
}

#[async_trait]
impl DenormalizeStore for MemoryStorage {
    async fn select_representatives(
        &self,
        spec: &DenormalizeSpec,
    ) -> Result<Vec<ChildSelection>, StorageError> {
        let state = self.state();
        let parent = state.table(&spec.parent_table)?;
        let child = state.table(&spec.child_table)?;
        let lacking: Vec<&str> = parent
            .rows
            .iter()
            .filter(|r| lacks_all(r, spec))
            .filter_map(|r| value(r, &spec.parent_key))
            .collect();

        let mut candidates: Vec<&Row> = child
            .rows
            .iter()
            .filter(|r| value(r, &spec.child_foreign_key).is_some_and(|k| lacking.contains(&k)))
            .collect();
        candidates.sort_by(|a, b| {
            std::iter::once(spec.child_foreign_key.as_str())
                .chain(spec.order_by.iter().map(String::as_str))
                .map(|c| nulls_last(value(a, c), value(b, c)))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.dedup_by(|a, b| value(a, &spec.child_foreign_key) == value(b, &spec.child_foreign_key));

        Ok(candidates
            .into_iter()
            .filter_map(|row| {
                Some(ChildSelection {
                    parent_key: value(row, &spec.child_foreign_key)?.to_owned(),
                    values: spec.child_columns().map(|c| value(row, c).map(str::to_owned)).collect(),
                })
            })
            .collect())
    }

    async fn copy_to_parent(
        &self,
        spec: &DenormalizeSpec,
        selection: &ChildSelection,
    ) -> Result<bool, StorageError> {
        let mut state = self.state();
        let position = state.table(&spec.parent_table)?.rows.iter().position(|r| {
            value(r, &spec.parent_key) == Some(selection.parent_key.as_str()) && lacks_all(r, spec)
        });
        let Some(index) = position else {
            return Ok(false);
        };
        let updates: Vec<(&str, Option<String>)> =
            spec.parent_columns().zip(selection.values.iter().cloned()).collect();
        state.update_row(&spec.parent_table, index, &updates)?;
        Ok(true)
    }

    async fn parents_lacking_fields(
        &self,
        spec: &DenormalizeSpec,
    ) -> Result<Vec<String>, StorageError> {
        let state = self.state();
        let parent = state.table(&spec.parent_table)?;
        if let Some(missing) = spec.parent_columns().find(|c| parent.column(c).is_none()) {
            return Err(not_found("column", &format!("{}.{missing}", spec.parent_table)));
        }
        Ok(state.sorted_keys(
            parent
                .rows
                .iter()
                .filter(|r| lacks_all(r, spec))
                .filter_map(|r| value(r, &spec.parent_key)),
        ))
    }
}

#[async_trait]
impl DuplicateStore for MemoryStorage {
    async fn natural_key_groups(
        &self,
        spec: &NaturalKeySpec,
    ) -> Result<Vec<DuplicateGroup>, StorageError> {
        let state = self.state();
        state.require_columns(
            &spec.table,
            &[spec.id_column.clone(), spec.key_column.clone(), spec.discriminator_column.clone()],
        )?;
        let mut rows: Vec<(String, DuplicateMember)> = state
            .table(&spec.table)?
            .rows
            .iter()
            .filter_map(|r| {
                Some((
                    value(r, &spec.key_column)?.to_owned(),
                    DuplicateMember {
                        id: value(r, &spec.id_column).unwrap_or_default().to_owned(),
                        discriminator: value(r, &spec.discriminator_column).map(str::to_owned),
                    },
                ))
            })
            .collect();
        rows.sort_by(|(ka, a), (kb, b)| {
            ka.cmp(kb)
                .then_with(|| nulls_last(a.discriminator.as_deref(), b.discriminator.as_deref()))
                .then_with(|| key_cmp(&a.id, &b.id))
        });
        Ok(group_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use dbshift_core::{ColumnDef, DdlAction, IdFormat, TableDef};

    use super::*;
    use crate::traits::SchemaStore;

    async fn seeded() -> MemoryStorage {
        let store = MemoryStorage::new();
        store
            .apply_ddl(&DdlAction::CreateTable(TableDef::new(
                "users",
                vec![
                    ColumnDef::new("id", "SERIAL").primary_key(),
                    ColumnDef::new("email", "VARCHAR(255)").not_null(),
                    ColumnDef::new("user_id", "VARCHAR(10)").unique(),
                    ColumnDef::new("provider", "VARCHAR(50)"),
                    ColumnDef::new("provider_account_id", "VARCHAR(255)"),
                ],
            )))
            .await
            .unwrap();
        store
            .apply_ddl(&DdlAction::CreateTable(TableDef::new(
                "accounts",
                vec![
                    ColumnDef::new("id", "SERIAL").primary_key(),
                    ColumnDef::new("user_id", "INTEGER").references("users", "id"),
                    ColumnDef::new("provider", "VARCHAR(50)"),
                    ColumnDef::new("provider_account_id", "VARCHAR(255)"),
                ],
            )))
            .await
            .unwrap();
        store
    }

    fn target() -> IdentifierTarget {
        IdentifierTarget::new("users", "id", "user_id", IdFormat::user_id())
    }

    fn spec() -> DenormalizeSpec {
        DenormalizeSpec::new("users", "id", "accounts", "user_id")
            .field("provider", "provider")
            .field("provider_account_id", "provider_account_id")
            .tie_break(&["provider", "provider_account_id"])
    }

    #[tokio::test]
    async fn missing_identifiers_are_ordered_numerically() {
        let store = seeded().await;
        for id in ["10", "2", "1"] {
            store.insert_row("users", &[("id", Some(id)), ("email", Some("e"))]).unwrap();
        }
        let keys = store.rows_missing_identifier(&target()).await.unwrap();
        assert_eq!(keys, vec!["1", "2", "10"]);
    }

    #[tokio::test]
    async fn assign_only_fills_null_and_enforces_uniqueness() {
        let store = seeded().await;
        store.insert_row("users", &[("id", Some("1")), ("email", Some("a"))]).unwrap();
        store.insert_row("users", &[("id", Some("2")), ("email", Some("b"))]).unwrap();

        assert!(store.assign_identifier(&target(), "1", "1234567890").await.unwrap());
        assert!(!store.assign_identifier(&target(), "1", "1234567891").await.unwrap());
        assert!(store.identifier_exists(&target(), "1234567890").await.unwrap());

        let err = store.assign_identifier(&target(), "2", "1234567890").await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(store.column_values("users", "user_id")[1], None);
    }

    #[tokio::test]
    async fn missing_column_is_not_found() {
        let store = MemoryStorage::new();
        let err = store.identifier_exists(&target(), "1234567890").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "table", .. }));
    }

    #[tokio::test]
    async fn unknown_natural_key_column_is_not_found() {
        let store = seeded().await;
        let spec = NaturalKeySpec::new("users", "id", "username", "provider");
        let err = store.natural_key_groups(&spec).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "column", .. }));
        assert!(err.to_string().contains("users.username"));
    }

    #[tokio::test]
    async fn representatives_follow_tie_break() {
        let store = seeded().await;
        store.insert_row("users", &[("id", Some("1")), ("email", Some("a"))]).unwrap();
        store.insert_row("users", &[("id", Some("2")), ("email", Some("b"))]).unwrap();
        store.insert_row("users", &[("id", Some("3")), ("email", Some("c"))]).unwrap();
        for (id, user, provider, account) in [
            ("1", "1", "google", "g-2"),
            ("2", "1", "github", "gh-1"),
            ("3", "1", "google", "g-1"),
            ("4", "2", "google", "g-9"),
        ] {
            store
                .insert_row("accounts", &[
                    ("id", Some(id)),
                    ("user_id", Some(user)),
                    ("provider", Some(provider)),
                    ("provider_account_id", Some(account)),
                ])
                .unwrap();
        }

        let picked = store.select_representatives(&spec()).await.unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].parent_key, "1");
        assert_eq!(picked[0].values, vec![Some("github".to_owned()), Some("gh-1".to_owned())]);
        assert_eq!(picked[1].parent_key, "2");

        assert!(store.copy_to_parent(&spec(), &picked[0]).await.unwrap());
        assert!(!store.copy_to_parent(&spec(), &picked[0]).await.unwrap());
        assert_eq!(store.parents_lacking_fields(&spec()).await.unwrap(), vec!["2", "3"]);
    }

    #[tokio::test]
    async fn natural_key_groups_skip_singletons() {
        let store = seeded().await;
        for (id, email, provider) in [
            ("1", "a@x", Some("google")),
            ("2", "a@x", None),
            ("3", "b@x", Some("github")),
            ("4", "a@x", Some("github")),
        ] {
            store
                .insert_row("users", &[("id", Some(id)), ("email", Some(email)), ("provider", provider)])
                .unwrap();
        }
        let groups = store
            .natural_key_groups(&NaturalKeySpec::new("users", "id", "email", "provider"))
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "a@x");
        assert_eq!(groups[0].discriminators(), vec!["github", "google", "<none>"]);
        assert!(!groups[0].is_expected());
    }
}
