use std::process;
use std::str::FromStr;
use std::time::Duration;

use sea_orm::{DatabaseConnection, SqlxPostgresConnector, SqlxSqliteConnector};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info, trace};

use crate::config::db::{Credentials, DbConfig, DbKind, DbOwner, DbTarget, PoolSettings};
use crate::error::ConnectionError;
use crate::infra::db::schema::ensure_schema;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ordered session-level SQL run on every new Postgres connection.
/// SQLite settings go through `SqliteConnectOptions` instead.
pub fn build_session_statements(db_kind: DbKind) -> Vec<String> {
    match db_kind {
        DbKind::Postgres => vec![
            "SET timezone = 'UTC';".to_string(),
            "SET statement_timeout = '30s';".to_string(),
            "SET idle_in_transaction_session_timeout = '60s';".to_string(),
        ],
        DbKind::SqliteFile | DbKind::SqliteMemory => Vec::new(),
    }
}

/// Open the shared pool for `config` as `owner`. Does not touch the schema.
///
/// There is deliberately no retry loop: an unreachable database or bad
/// credentials surface immediately.
pub async fn connect(
    config: &DbConfig,
    owner: DbOwner,
) -> Result<DatabaseConnection, ConnectionError> {
    config.validate()?;
    build_pool(config, owner, config.pool).await
}

/// Single-connection pool with owner credentials, used for migrations.
pub async fn build_admin_pool(config: &DbConfig) -> Result<DatabaseConnection, ConnectionError> {
    config.validate()?;
    let settings = PoolSettings {
        min_connections: 1,
        max_connections: 1,
        acquire_timeout: config.pool.acquire_timeout,
    };
    build_pool(config, DbOwner::Owner, settings).await
}

/// Build the test DB pool *and* apply the configured schema policy.
pub async fn bootstrap_test_db(config: &DbConfig) -> Result<DatabaseConnection, ConnectionError> {
    config.validate()?;

    let db_kind = config.kind();
    info!(
        "bootstrap=start db_kind={:?} engine={} target={} schema={:?} pid={}",
        db_kind,
        db_kind.engine(),
        config.describe(),
        config.schema,
        process::id()
    );

    let conn = match connect(config, DbOwner::App).await {
        Ok(conn) => conn,
        Err(e) => {
            error!("bootstrap=failed target={} error={}", config.describe(), e);
            return Err(e);
        }
    };

    ensure_schema(config, &conn).await?;

    info!("bootstrap=ready target={}", config.describe());
    Ok(conn)
}

async fn build_pool(
    config: &DbConfig,
    owner: DbOwner,
    pool_cfg: PoolSettings,
) -> Result<DatabaseConnection, ConnectionError> {
    let target = config.describe();
    let connect_err = |source: sqlx::Error| ConnectionError::Connect {
        target: target.clone(),
        source,
    };

    match &config.target {
        // ---------- SQLite (file and in-memory) ----------
        DbTarget::SqliteFile { .. } | DbTarget::SqliteMemory => {
            let connect_opts = match &config.target {
                DbTarget::SqliteFile { path } => SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true),
                _ => SqliteConnectOptions::from_str("sqlite::memory:").map_err(connect_err)?,
            }
            .foreign_keys(true)
            .busy_timeout(SQLITE_BUSY_TIMEOUT);

            let mut options = SqlitePoolOptions::new()
                .min_connections(pool_cfg.min_connections)
                .max_connections(pool_cfg.max_connections)
                .acquire_timeout(pool_cfg.acquire_timeout);

            if config.kind() == DbKind::SqliteMemory {
                // The single connection *is* the database; never recycle it.
                options = options
                    .min_connections(1)
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None);
            }

            let pool = options
                .connect_with(connect_opts)
                .await
                .map_err(connect_err)?;

            info!(
                "pool=create engine=sqlite target={} owner={:?} min={} max={} acquire_timeout_ms={}",
                target,
                owner,
                pool.options().get_min_connections(),
                pool.options().get_max_connections(),
                pool_cfg.acquire_timeout.as_millis()
            );

            Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
        }

        // ---------- Postgres ----------
        DbTarget::Postgres {
            host,
            port,
            database,
            ..
        } => {
            let creds: &Credentials = config.credentials(owner).ok_or_else(|| {
                ConnectionError::config("no credentials configured for Postgres target")
            })?;

            let connect_opts = PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(&creds.user)
                .password(creds.password())
                .database(database)
                .application_name(&config.app_name);

            let statements = build_session_statements(DbKind::Postgres);
            let pool = PgPoolOptions::new()
                .min_connections(pool_cfg.min_connections)
                .max_connections(pool_cfg.max_connections)
                .acquire_timeout(pool_cfg.acquire_timeout)
                .idle_timeout(Duration::from_secs(30))
                .after_connect(move |conn, _meta| {
                    let statements = statements.clone();
                    Box::pin(async move {
                        for stmt in &statements {
                            sqlx::query(stmt).execute(&mut *conn).await?;
                        }
                        trace!("db=postgres hook=after_connect ok");
                        Ok::<_, sqlx::Error>(())
                    })
                })
                .connect_with(connect_opts)
                .await
                .map_err(connect_err)?;

            info!(
                "pool=create engine=postgres target={} owner={:?} user={} min={} max={} acquire_timeout_ms={}",
                target,
                owner,
                creds.user,
                pool_cfg.min_connections,
                pool_cfg.max_connections,
                pool_cfg.acquire_timeout.as_millis()
            );

            Ok(SqlxPostgresConnector::from_sqlx_postgres_pool(pool))
        }
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{ConnectionTrait, DbBackend, Statement};

    use super::*;
    use crate::config::db::SchemaPolicy;

    #[test]
    fn test_postgres_session_statements_are_ordered() {
        let stmts = build_session_statements(DbKind::Postgres);
        assert_eq!(stmts[0], "SET timezone = 'UTC';");
        assert!(stmts.iter().any(|s| s.contains("statement_timeout")));
        assert!(build_session_statements(DbKind::SqliteMemory).is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_memory_connection_enables_foreign_keys() {
        let config = DbConfig::sqlite_memory().with_schema(SchemaPolicy::Skip);
        let conn = connect(&config, DbOwner::App).await.unwrap();

        let row = conn
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                "PRAGMA foreign_keys;",
            ))
            .await
            .unwrap()
            .expect("pragma returns a row");
        let enabled: i64 = row.try_get_by_index(0).unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_memory_pool_keeps_state_across_statements() {
        let config = DbConfig::sqlite_memory().with_schema(SchemaPolicy::Skip);
        let conn = connect(&config, DbOwner::App).await.unwrap();

        conn.execute_unprepared("CREATE TABLE scratch (id INTEGER PRIMARY KEY);")
            .await
            .unwrap();
        conn.execute_unprepared("INSERT INTO scratch (id) VALUES (7);")
            .await
            .unwrap();

        let row = conn
            .query_one(Statement::from_string(
                DbBackend::Sqlite,
                "SELECT COUNT(*) FROM scratch;",
            ))
            .await
            .unwrap()
            .unwrap();
        let count: i64 = row.try_get_by_index(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_connect_validates_before_dialing() {
        let config = DbConfig::sqlite_file("/tmp/not-a-test-db.sqlite");
        let err = connect(&config, DbOwner::App).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Config { .. }));
    }
}
