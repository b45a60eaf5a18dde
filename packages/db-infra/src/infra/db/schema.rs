use migration::{schema_status, MigrationCommand};
use sea_orm::DatabaseConnection;
use tracing::{info, trace, warn};

use crate::config::db::{DbConfig, DbKind, SchemaPolicy};
use crate::error::ConnectionError;
use crate::infra::db::core::build_admin_pool;
use crate::infra::db::migrate::migrate_locked;

/// Apply `config.schema` to an already-open pool.
///
/// `Migrate` always runs under the database's migration lock.
/// - InMemory: migrations must run on `conn` itself, since every connection
///   is its own database.
/// - Postgres: migrate through a one-connection owner pool (app credentials
///   when no owner is configured), which also holds the advisory lock.
/// - SqliteFile migrates on `conn` under a file lock.
pub async fn ensure_schema(
    config: &DbConfig,
    conn: &DatabaseConnection,
) -> Result<(), ConnectionError> {
    match config.schema {
        SchemaPolicy::Skip => {
            trace!(schema = "skip", target = %config.describe());
            Ok(())
        }
        SchemaPolicy::Migrate => {
            if config.kind() == DbKind::Postgres {
                let admin = build_admin_pool(config).await?;
                let result = migrate_locked(config, &admin, MigrationCommand::Up).await;
                if let Err(e) = admin.close().await {
                    warn!("schema=migrate admin_pool_close_failed error={}", e);
                }
                result?;
            } else {
                migrate_locked(config, conn, MigrationCommand::Up).await?;
            }
            info!("schema=migrated target={}", config.describe());
            Ok(())
        }
        SchemaPolicy::RequireCurrent => {
            let status = schema_status(conn).await?;
            if status.is_current() {
                trace!(
                    schema = "current",
                    applied = status.applied,
                    defined = status.defined
                );
                return Ok(());
            }

            Err(ConnectionError::Schema {
                target: config.describe(),
                detail: format!(
                    "{} of {} migrations applied (latest applied: {}, expected: {}). \
                     Run `migration-cli up` against the test database first.",
                    status.applied,
                    status.defined,
                    status.latest_applied.as_deref().unwrap_or("none"),
                    status.latest_defined.as_deref().unwrap_or("none"),
                ),
            })
        }
    }
}
