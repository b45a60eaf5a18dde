use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use db_infra::{build_admin_pool, migrate_locked, DbConfig, DbKind};
use migration::MigrationCommand;
use tracing::{error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Command {
    Up,
    Down,
    Fresh,
    Reset,
    Refresh,
    Status,
}

impl From<Command> for MigrationCommand {
    fn from(c: Command) -> Self {
        match c {
            Command::Up => MigrationCommand::Up,
            Command::Down => MigrationCommand::Down,
            Command::Fresh => MigrationCommand::Fresh,
            Command::Reset => MigrationCommand::Reset,
            Command::Refresh => MigrationCommand::Refresh,
            Command::Status => MigrationCommand::Status,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "migration-cli")]
#[command(about = "Apply schema migrations to the test database")]
struct Args {
    /// Migration command to run
    #[arg(value_enum)]
    command: Command,

    /// Env file to read before the process environment (default: .env.test if present)
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .without_time()
        .with_target(false)
        .with_env_filter("info,sqlx=warn,sea_orm=warn")
        .init();

    let args = Args::parse();

    let config = match DbConfig::load(args.env_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid database configuration: {e}");
            process::exit(2);
        }
    };

    if config.kind() == DbKind::SqliteMemory {
        eprintln!("SQLite in-memory databases are not supported for CLI operations.");
        eprintln!("Each run would migrate a fresh database that vanishes when the command exits.");
        eprintln!("Set DB_KIND=postgres or DB_KIND=sqlite-file (with SQLITE_PATH).");
        process::exit(2);
    }

    if let Err(e) = run(&config, args.command.into()).await {
        error!("migration=failed target={} error={}", config.describe(), e);
        eprintln!("Migration failed: {e}");
        process::exit(1);
    }
}

async fn run(
    config: &DbConfig,
    command: MigrationCommand,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "migration=connect target={} command={:?}",
        config.describe(),
        command
    );
    let conn = build_admin_pool(config).await?;
    let result = migrate_locked(config, &conn, command).await;
    conn.close().await?;
    result?;
    Ok(())
}
