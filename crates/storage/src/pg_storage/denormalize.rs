//! DenormalizeStore and DuplicateStore implementations for PgStorage.
//!
//! Values are read and written as text. The mapped columns of the plans are
//! all character types, for which PostgreSQL applies the text assignment
//! implicitly.

use async_trait::async_trait;
use dbshift_core::{
    ChildSelection, DenormalizeSpec, DuplicateGroup, DuplicateMember, NaturalKeySpec, group_rows,
};
use sqlx::Row;

use super::{PgStorage, all_null};
use crate::error::StorageError;
use crate::traits::{DenormalizeStore, DuplicateStore};

fn select_representatives_sql(spec: &DenormalizeSpec) -> String {
    let values = spec.child_columns().map(|c| format!("c.{c}::text")).collect::<Vec<_>>();
    let mut order = vec![format!("c.{}", spec.child_foreign_key)];
    order.extend(spec.order_by.iter().map(|c| format!("c.{c}")));
    format!(
        "SELECT DISTINCT ON (c.{fk}) c.{fk}::text, {values}
         FROM {child} c
         JOIN {parent} p ON p.{pkey} = c.{fk}
         WHERE {lacking}
         ORDER BY {order}",
        fk = spec.child_foreign_key,
        values = values.join(", "),
        child = spec.child_table,
        parent = spec.parent_table,
        pkey = spec.parent_key,
        lacking = all_null("p", spec.parent_columns()),
        order = order.join(", "),
    )
}

fn copy_to_parent_sql(spec: &DenormalizeSpec) -> String {
    let assignments = spec
        .parent_columns()
        .enumerate()
        .map(|(i, c)| format!("{c} = ${}", i + 1))
        .collect::<Vec<_>>();
    format!(
        "UPDATE {parent} AS p SET {assignments} WHERE p.{pkey}::text = ${key_param} AND {lacking}",
        parent = spec.parent_table,
        assignments = assignments.join(", "),
        pkey = spec.parent_key,
        key_param = spec.fields.len() + 1,
        lacking = all_null("p", spec.parent_columns()),
    )
}

fn natural_key_sql(spec: &NaturalKeySpec) -> String {
    format!(
        "SELECT {key}::text, {id}::text, {disc}::text FROM {table}
         WHERE {key} IN (
             SELECT {key} FROM {table} WHERE {key} IS NOT NULL
             GROUP BY {key} HAVING COUNT(*) > 1)
         ORDER BY {key}, {disc} NULLS LAST, {id}",
        key = spec.key_column,
        id = spec.id_column,
        disc = spec.discriminator_column,
        table = spec.table,
    )
}

#[async_trait]
impl DenormalizeStore for PgStorage {
    async fn select_representatives(
        &self,
        spec: &DenormalizeSpec,
    ) -> Result<Vec<ChildSelection>, StorageError> {
        let rows = sqlx::query(&select_representatives_sql(spec)).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                let parent_key: String = row.try_get(0)?;
                let values = (1..=spec.fields.len())
                    .map(|i| row.try_get::<Option<String>, _>(i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ChildSelection { parent_key, values })
            })
            .collect()
    }

    async fn copy_to_parent(
        &self,
        spec: &DenormalizeSpec,
        selection: &ChildSelection,
    ) -> Result<bool, StorageError> {
        let sql = copy_to_parent_sql(spec);
        let mut query = sqlx::query(&sql);
        for value in &selection.values {
            query = query.bind(value.as_deref());
        }
        let result = query.bind(&selection.parent_key).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn parents_lacking_fields(
        &self,
        spec: &DenormalizeSpec,
    ) -> Result<Vec<String>, StorageError> {
        let sql = format!(
            "SELECT p.{pkey}::text FROM {parent} p WHERE {lacking} ORDER BY p.{pkey}",
            pkey = spec.parent_key,
            parent = spec.parent_table,
            lacking = all_null("p", spec.parent_columns()),
        );
        Ok(sqlx::query_scalar(&sql).fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl DuplicateStore for PgStorage {
    async fn natural_key_groups(
        &self,
        spec: &NaturalKeySpec,
    ) -> Result<Vec<DuplicateGroup>, StorageError> {
        let rows = sqlx::query(&natural_key_sql(spec)).fetch_all(&self.pool).await?;
        let members = rows
            .iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>(0)?,
                    DuplicateMember { id: row.try_get(1)?, discriminator: row.try_get(2)? },
                ))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(group_rows(members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> DenormalizeSpec {
        DenormalizeSpec::new("users", "id", "accounts", "user_id")
            .field("provider", "provider")
            .field("provider_account_id", "provider_account_id")
            .tie_break(&["provider", "provider_account_id"])
    }

    fn squash(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn representatives_use_distinct_on_with_tie_break() {
        assert_eq!(
            squash(&select_representatives_sql(&accounts())),
            "SELECT DISTINCT ON (c.user_id) c.user_id::text, c.provider::text, \
             c.provider_account_id::text FROM accounts c JOIN users p ON p.id = c.user_id \
             WHERE p.provider IS NULL AND p.provider_account_id IS NULL \
             ORDER BY c.user_id, c.provider, c.provider_account_id"
        );
    }

    #[test]
    fn copy_is_guarded_by_lacking_predicate() {
        assert_eq!(
            squash(&copy_to_parent_sql(&accounts())),
            "UPDATE users AS p SET provider = $1, provider_account_id = $2 \
             WHERE p.id::text = $3 AND p.provider IS NULL AND p.provider_account_id IS NULL"
        );
    }

    #[test]
    fn natural_key_query_orders_members() {
        let spec = NaturalKeySpec::new("users", "id", "email", "provider");
        let sql = squash(&natural_key_sql(&spec));
        assert!(sql.contains("HAVING COUNT(*) > 1"));
        assert!(sql.ends_with("ORDER BY email, provider NULLS LAST, id"));
    }
}
