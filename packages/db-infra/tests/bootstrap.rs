//! Bootstrap behavior against real SQLite databases (file and in-memory).

use db_infra::{bootstrap_test_db, ConnectionError, DbConfig, SchemaPolicy};
use migration::schema_status;
use tokio::task::JoinSet;

#[tokio::test]
async fn test_memory_bootstrap_migrates_schema() -> Result<(), Box<dyn std::error::Error>> {
    let conn = bootstrap_test_db(&DbConfig::sqlite_memory()).await?;

    let status = schema_status(&conn).await?;
    assert!(status.is_current(), "in-memory DB should be migrated: {status:?}");

    Ok(())
}

#[tokio::test]
async fn test_require_current_rejects_unmigrated_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::sqlite_file(dir.path().join("agenda_test.db"));
    assert_eq!(config.schema, SchemaPolicy::RequireCurrent);

    let err = bootstrap_test_db(&config).await.unwrap_err();
    match err {
        ConnectionError::Schema { detail, .. } => {
            assert!(detail.contains("0 of 1"), "unexpected detail: {detail}");
            assert!(detail.contains("migration-cli"));
        }
        other => panic!("expected schema error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_file_schema_survives_reconnect() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("agenda_test.db");

    let migrated =
        bootstrap_test_db(&DbConfig::sqlite_file(&path).with_schema(SchemaPolicy::Migrate))
            .await?;
    migrated.close().await?;

    // Second run only verifies.
    let conn = bootstrap_test_db(&DbConfig::sqlite_file(&path)).await?;
    assert!(schema_status(&conn).await?.is_current());

    Ok(())
}

#[tokio::test]
async fn test_unreachable_file_location_is_connect_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("nested").join("agenda_test.db");

    let err = bootstrap_test_db(&DbConfig::sqlite_file(path))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ConnectionError::Connect { .. }),
        "expected connect error, got {err:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_migrate_bootstraps_share_one_file() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = tempfile::tempdir()?;
    let config =
        DbConfig::sqlite_file(dir.path().join("race_test.db")).with_schema(SchemaPolicy::Migrate);

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let config = config.clone();
        tasks.spawn(async move { bootstrap_test_db(&config).await });
    }

    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(conn) => conn.close().await?,
            Err(e) => failures.push(e.to_string()),
        }
    }
    assert!(failures.is_empty(), "bootstraps failed: {failures:?}");

    let conn = bootstrap_test_db(&DbConfig::sqlite_file(dir.path().join("race_test.db"))).await?;
    assert!(schema_status(&conn).await?.is_current());
    Ok(())
}
