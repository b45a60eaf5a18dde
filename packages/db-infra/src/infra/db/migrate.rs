use std::time::{Duration, Instant};

use migration::{migrate, schema_status, MigrationCommand};
use rand::Rng;
use sea_orm::DatabaseConnection;
use tracing::{debug, info, trace, warn};

use crate::config::db::{DbConfig, DbTarget};
use crate::error::ConnectionError;
use crate::infra::db::locking::{InMemoryLock, MigrationLock, PgAdvisoryLock, SqliteFileLock};

const MAX_BACKOFF_MS: u64 = 80;

/// Run `command` against `conn` while holding the migration lock for
/// `config`'s database, so concurrent bootstraps never race on DDL.
///
/// For Postgres `conn` must be a single-connection pool (see
/// [`build_admin_pool`](crate::build_admin_pool)): the advisory lock lives
/// on one session. `Status` is read-only and takes no lock.
pub async fn migrate_locked(
    config: &DbConfig,
    conn: &DatabaseConnection,
    command: MigrationCommand,
) -> Result<(), ConnectionError> {
    if !command.mutates() {
        migrate(conn, command).await?;
        return Ok(());
    }

    match &config.target {
        DbTarget::SqliteMemory => migrate_with_lock(config, conn, InMemoryLock, command).await,
        DbTarget::SqliteFile { path } => {
            let lock = SqliteFileLock::for_database(path);
            migrate_with_lock(config, conn, lock, command).await
        }
        DbTarget::Postgres { .. } => {
            let key = format!("txn-harness:migrate:{}", config.describe());
            let lock = PgAdvisoryLock::new(conn.clone(), &key);
            migrate_with_lock(config, conn, lock, command).await
        }
    }
}

async fn migrate_with_lock<L: MigrationLock>(
    config: &DbConfig,
    conn: &DatabaseConnection,
    mut lock: L,
    command: MigrationCommand,
) -> Result<(), ConnectionError> {
    let started = Instant::now();
    let mut attempts: u32 = 0;

    let guard = loop {
        attempts += 1;

        // another process may have finished while we waited
        if command == MigrationCommand::Up && schema_status(conn).await?.is_current() {
            info!(
                "migrate=skipped up_to_date=true attempts={} waited_ms={}",
                attempts,
                started.elapsed().as_millis()
            );
            return Ok(());
        }

        if let Some(guard) = lock.try_acquire().await? {
            trace!(lock = "won", attempts, elapsed_ms = started.elapsed().as_millis() as u64);
            break guard;
        }

        if started.elapsed() >= config.migrate_lock_timeout {
            return Err(ConnectionError::Lock {
                target: config.describe(),
                detail: format!(
                    "migration lock not acquired within {:?} ({} attempts)",
                    config.migrate_lock_timeout, attempts
                ),
            });
        }

        let delay = backoff_delay(attempts);
        trace!(lock = "backoff", attempts, delay_ms = delay.as_millis() as u64);
        tokio::time::sleep(delay).await;
    };

    let result = migrate(conn, command).await;
    if let Err(e) = guard.release().await {
        warn!("migrate=lock_release_failed target={} error={}", config.describe(), e);
    }
    debug!("migrate=unlocked attempts={}", attempts);
    result.map_err(ConnectionError::from)
}

/// 5, 10, 20, 40, 80, 80, ... ms plus a little jitter so waiters spread out.
fn backoff_delay(attempts: u32) -> Duration {
    let shift = attempts.saturating_sub(1).min(4);
    let base_ms = (5u64 << shift).min(MAX_BACKOFF_MS);
    let jitter_ms = rand::rng().random_range(0..4u64);
    Duration::from_millis(base_ms + jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::db::SchemaPolicy;
    use crate::infra::db::core::connect;
    use crate::DbOwner;

    #[test]
    fn test_backoff_grows_then_caps() {
        assert!(backoff_delay(1) < Duration::from_millis(9));
        assert!(backoff_delay(3) >= Duration::from_millis(20));
        for attempts in [5, 6, 40, u32::MAX] {
            let d = backoff_delay(attempts);
            assert!(d >= Duration::from_millis(MAX_BACKOFF_MS), "{d:?}");
            assert!(d < Duration::from_millis(MAX_BACKOFF_MS + 4), "{d:?}");
        }
    }

    #[tokio::test]
    async fn test_held_lock_times_out_with_lock_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("held_test.db");
        let config = DbConfig::sqlite_file(&path)
            .with_schema(SchemaPolicy::Skip)
            .with_migrate_lock_timeout(Duration::from_millis(100));
        let conn = connect(&config, DbOwner::App).await.unwrap();

        let mut holder = SqliteFileLock::for_database(&path);
        let held = holder.try_acquire().await.unwrap().unwrap();

        let err = migrate_locked(&config, &conn, MigrationCommand::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Lock { .. }), "{err:?}");

        held.release().await.unwrap();
        migrate_locked(&config, &conn, MigrationCommand::Up)
            .await
            .unwrap();
        assert!(schema_status(&conn).await.unwrap().is_current());
    }

    #[tokio::test]
    async fn test_status_needs_no_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status_test.db");
        let config = DbConfig::sqlite_file(&path).with_schema(SchemaPolicy::Skip);
        let conn = connect(&config, DbOwner::App).await.unwrap();

        let mut holder = SqliteFileLock::for_database(&path);
        let held = holder.try_acquire().await.unwrap().unwrap();
        migrate_locked(&config, &conn, MigrationCommand::Status)
            .await
            .unwrap();
        held.release().await.unwrap();
    }
}
