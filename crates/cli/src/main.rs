use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "dbshift")]
#[command(about = "Idempotent PostgreSQL schema migrations", long_about = None)]
struct Cli {
    /// Load environment from this file instead of .env.local / .env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print the server version
    Check,
    /// Add, backfill and enforce users.user_id
    AddUserId,
    /// Fold accounts into users.provider / users.provider_account_id
    MigrateAccounts,
    /// Create the OAuth session tables
    Nextauth,
    /// Drop the application schema and rebuild it from a script
    Reset {
        #[arg(short, long)]
        schema: PathBuf,
        /// Confirm that existing tables and data will be dropped
        #[arg(long)]
        yes: bool,
    },
    /// Print tables, columns, indexes, foreign keys and row counts as JSON
    Inspect,
    /// Print the statements of a SQL script without connecting
    Split { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let env_file = cli.env_file.as_deref();

    match cli.command {
        Commands::Check => commands::check::run(env_file).await,
        Commands::AddUserId => {
            commands::plan::run(env_file, dbshift_service::plans::add_user_id()).await
        },
        Commands::MigrateAccounts => {
            commands::plan::run(env_file, dbshift_service::plans::migrate_accounts()).await
        },
        Commands::Nextauth => commands::plan::run(env_file, dbshift_service::plans::nextauth()).await,
        Commands::Reset { schema, yes } => commands::plan::run_reset(env_file, &schema, yes).await,
        Commands::Inspect => commands::inspect::run(env_file).await,
        Commands::Split { path } => commands::split::run(&path),
    }
}
