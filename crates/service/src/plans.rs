//! The named migration plans shipped with the CLI.

use dbshift_core::{
    ColumnDef, ConstraintKind, DdlAction, DenormalizeSpec, IdFormat, IdentifierTarget,
    MigrationStep, NaturalKeySpec, TableDef, split_script,
};

use crate::pipeline::{Plan, Stage};

pub const ADD_USER_ID: &str = "add-user-id";
pub const MIGRATE_ACCOUNTS: &str = "migrate-accounts";
pub const NEXTAUTH: &str = "nextauth";
pub const RESET: &str = "reset";

fn ddl(name: impl Into<String>, action: DdlAction) -> Stage {
    Stage::Ddl(MigrationStep::new(name, action))
}

fn add_column(table: &str, column: ColumnDef) -> Stage {
    ddl(format!("add {table}.{}", column.name), DdlAction::AddColumn {
        table: table.to_owned(),
        column,
    })
}

fn create_index(name: &str, table: &str, columns: &[&str]) -> Stage {
    ddl(format!("create index {name}"), DdlAction::CreateIndex {
        name: name.to_owned(),
        table: table.to_owned(),
        columns: columns.iter().map(|c| (*c).to_owned()).collect(),
        unique: false,
    })
}

fn add_unique(table: &str, name: &str, columns: &[&str]) -> Stage {
    ddl(format!("add constraint {name}"), DdlAction::AddConstraint {
        table: table.to_owned(),
        name: name.to_owned(),
        kind: ConstraintKind::unique(columns),
    })
}

fn drop_constraint(table: &str, name: &str) -> Stage {
    ddl(format!("drop constraint {name}"), DdlAction::DropConstraint {
        table: table.to_owned(),
        name: name.to_owned(),
    })
}

fn create_table(def: TableDef) -> Stage {
    ddl(format!("create table {}", def.name), DdlAction::CreateTable(def))
}

fn drop_table(name: &str) -> Stage {
    ddl(format!("drop table {name}"), DdlAction::DropTable { name: name.to_owned(), cascade: true })
}

/// Public 10-digit `users.user_id`, backfilled and made mandatory, and
/// email uniqueness widened to `(email, username)`.
#[must_use]
pub fn add_user_id() -> Plan {
    Plan::new(ADD_USER_ID, vec![
        add_column("users", ColumnDef::new("user_id", "VARCHAR(10)").unique()),
        create_index("idx_users_user_id", "users", &["user_id"]),
        Stage::Backfill {
            target: IdentifierTarget::new("users", "id", "user_id", IdFormat::user_id()),
            tighten: true,
        },
        drop_constraint("users", "users_email_key"),
        add_unique("users", "users_email_username_unique", &["email", "username"]),
    ])
}

/// Fold `accounts` into `users.provider` / `users.provider_account_id` and
/// retire the `accounts` table.
#[must_use]
pub fn migrate_accounts() -> Plan {
    let accounts = DenormalizeSpec::new("users", "id", "accounts", "user_id")
        .field("provider", "provider")
        .field("provider_account_id", "provider_account_id")
        .tie_break(&["provider", "provider_account_id"]);
    Plan::new(MIGRATE_ACCOUNTS, vec![
        add_column("users", ColumnDef::new("provider", "VARCHAR(50)")),
        add_column("users", ColumnDef::new("provider_account_id", "VARCHAR(255)")),
        Stage::Denormalize(accounts),
        add_unique("users", "users_provider_account_unique", &["provider", "provider_account_id"]),
        create_index("idx_users_provider_account", "users", &["provider", "provider_account_id"]),
        drop_constraint("accounts", "accounts_user_id_fkey"),
        drop_table("accounts"),
        Stage::DetectDuplicates(NaturalKeySpec::new("users", "id", "email", "provider")),
    ])
}

/// Tables and columns an OAuth session layer expects next to `users`.
#[must_use]
pub fn nextauth() -> Plan {
    let accounts = TableDef::new("accounts", vec![
        ColumnDef::new("id", "UUID").primary_key().default_expr("gen_random_uuid()"),
        ColumnDef::new("user_id", "UUID").not_null().references("users", "id"),
        ColumnDef::new("type", "VARCHAR(255)").not_null(),
        ColumnDef::new("provider", "VARCHAR(255)").not_null(),
        ColumnDef::new("provider_account_id", "VARCHAR(255)").not_null(),
        ColumnDef::new("refresh_token", "TEXT"),
        ColumnDef::new("access_token", "TEXT"),
        ColumnDef::new("expires_at", "INTEGER"),
        ColumnDef::new("token_type", "VARCHAR(255)"),
        ColumnDef::new("scope", "TEXT"),
        ColumnDef::new("id_token", "TEXT"),
        ColumnDef::new("session_state", "TEXT"),
    ])
    .unique_together(&["provider", "provider_account_id"]);

    let sessions = TableDef::new("sessions", vec![
        ColumnDef::new("id", "UUID").primary_key().default_expr("gen_random_uuid()"),
        ColumnDef::new("session_token", "VARCHAR(255)").unique().not_null(),
        ColumnDef::new("user_id", "UUID").not_null().references("users", "id"),
        ColumnDef::new("expires", "TIMESTAMPTZ").not_null(),
    ]);

    let verification_tokens = TableDef::new("verification_tokens", vec![
        ColumnDef::new("identifier", "VARCHAR(255)").not_null(),
        ColumnDef::new("token", "VARCHAR(255)").not_null(),
        ColumnDef::new("expires", "TIMESTAMPTZ").not_null(),
    ])
    .unique_together(&["identifier", "token"]);

    Plan::new(NEXTAUTH, vec![
        ddl("drop NOT NULL on users.password_hash", DdlAction::DropNotNull {
            table: "users".to_owned(),
            column: "password_hash".to_owned(),
        }),
        add_column("users", ColumnDef::new("email_verified", "TIMESTAMPTZ")),
        create_table(accounts),
        create_index("idx_accounts_user_id", "accounts", &["user_id"]),
        create_table(sessions),
        create_index("idx_sessions_user_id", "sessions", &["user_id"]),
        create_table(verification_tokens),
    ])
}

/// Drop the application schema and rebuild it from `schema_script`.
#[must_use]
pub fn reset(schema_script: &str) -> Plan {
    Plan::new(RESET, vec![
        drop_table("posts"),
        drop_table("users"),
        ddl("drop function update_updated_at_column", DdlAction::DropFunction {
            name: "update_updated_at_column".to_owned(),
        }),
        Stage::Script { label: "schema".to_owned(), statements: split_script(schema_script) },
    ])
}

/// Plans that need no input besides the database.
#[must_use]
pub fn by_name(name: &str) -> Option<Plan> {
    match name {
        ADD_USER_ID => Some(add_user_id()),
        MIGRATE_ACCOUNTS => Some(migrate_accounts()),
        NEXTAUTH => Some(nextauth()),
        _ => None,
    }
}
