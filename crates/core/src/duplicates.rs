//! Natural-key duplicate groups reported after a migration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::schema::validate_all;

/// Group rows of `table` by `key_column`; `discriminator_column` tells
/// legitimate duplicates (e.g. one user per OAuth provider) apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NaturalKeySpec {
    pub table: String,
    pub id_column: String,
    pub key_column: String,
    pub discriminator_column: String,
}

impl NaturalKeySpec {
    pub fn new(
        table: impl Into<String>,
        id_column: impl Into<String>,
        key_column: impl Into<String>,
        discriminator_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            id_column: id_column.into(),
            key_column: key_column.into(),
            discriminator_column: discriminator_column.into(),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_all([
            self.table.as_str(),
            self.id_column.as_str(),
            self.key_column.as_str(),
            self.discriminator_column.as_str(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateMember {
    pub id: String,
    pub discriminator: Option<String>,
}

/// Rows sharing one natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub key: String,
    pub members: Vec<DuplicateMember>,
}

impl DuplicateGroup {
    #[must_use]
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Duplication is expected when every member carries a distinct discriminator.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        let mut seen = HashSet::new();
        self.members
            .iter()
            .all(|m| m.discriminator.as_deref().is_some_and(|d| seen.insert(d)))
    }

    #[must_use]
    pub fn discriminators(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.discriminator.as_deref().unwrap_or("<none>")).collect()
    }
}

/// Assemble groups from rows already ordered by key; singletons are dropped.
#[must_use]
pub fn group_rows(rows: Vec<(String, DuplicateMember)>) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    for (key, member) in rows {
        match groups.last_mut() {
            Some(group) if group.key == key => group.members.push(member),
            _ => groups.push(DuplicateGroup { key, members: vec![member] }),
        }
    }
    groups.retain(|g| g.count() > 1);
    groups
}

/// Advisory result of a duplicate scan. Nothing here is ever auto-resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub groups: Vec<DuplicateGroup>,
}

impl DuplicateReport {
    pub fn expected(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter().filter(|g| g.is_expected())
    }

    pub fn unexpected(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter().filter(|g| !g.is_expected())
    }
}
