pub use sea_orm_migration::prelude::*;
pub use sea_orm_migration::sea_orm::{ConnectionTrait, DatabaseConnection};

mod m20260301_000001_init; // keep filename + module name in sync

/// Bookkeeping table maintained by sea-orm-migration.
pub const MIGRATION_TABLE: &str = "seaql_migrations";

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260301_000001_init::Migration)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationCommand {
    Up,
    Down,
    Fresh,
    Reset,
    Refresh,
    Status,
}

impl MigrationCommand {
    /// Whether the command can change the schema.
    pub fn mutates(self) -> bool {
        !matches!(self, MigrationCommand::Status)
    }
}

/// Applied vs. defined migrations for one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaStatus {
    pub applied: usize,
    pub defined: usize,
    pub latest_applied: Option<String>,
    pub latest_defined: Option<String>,
}

impl SchemaStatus {
    /// True when every defined migration has been applied, in order.
    pub fn is_current(&self) -> bool {
        self.applied == self.defined && self.latest_applied == self.latest_defined
    }
}

/// Migration function that bypasses environment parsing
/// Used by both the CLI and the test harness bootstrap
pub async fn migrate(db: &DatabaseConnection, command: MigrationCommand) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let before = schema_status(db).await?;

    tracing::info!(
        "migrate=start cmd={command:?} backend={backend:?} defined={} applied={}",
        before.defined,
        before.applied
    );

    let result = match command {
        MigrationCommand::Up => Migrator::up(db, None).await,
        MigrationCommand::Down => Migrator::down(db, None).await,
        MigrationCommand::Fresh => Migrator::fresh(db).await,
        MigrationCommand::Reset => Migrator::reset(db).await,
        MigrationCommand::Refresh => Migrator::refresh(db).await,
        MigrationCommand::Status => Migrator::status(db).await,
    };

    match result {
        Ok(()) => {
            if command.mutates() {
                let after = schema_status(db).await?;
                tracing::info!(
                    "migrate=done cmd={command:?} defined={} applied={}",
                    after.defined,
                    after.applied
                );
            } else {
                tracing::info!("migrate=done cmd={command:?}");
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("migrate=failed cmd={command:?} backend={backend:?} error={e}");
            Err(e)
        }
    }
}

/// Compare applied migrations against the ones compiled into [`Migrator`].
///
/// A database without the bookkeeping table reports zero applied migrations.
pub async fn schema_status(db: &DatabaseConnection) -> Result<SchemaStatus, DbErr> {
    let defined = Migrator::migrations();
    let latest_defined = defined.last().map(|m| m.name().to_string());

    let applied = if SchemaManager::new(db).has_table(MIGRATION_TABLE).await? {
        Migrator::get_applied_migrations(db).await?
    } else {
        Vec::new()
    };

    Ok(SchemaStatus {
        applied: applied.len(),
        defined: defined.len(),
        latest_applied: applied.last().map(|m| m.name().to_string()),
        latest_defined,
    })
}
