//! A failing test body keeps its own outcome; the rollback happens anyway.

mod common;
mod support;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use sea_orm::{ConnectionTrait, DbBackend};
use support::appointments;
use txn_harness::{unique_str, HarnessError, TestDb};

#[derive(Debug, thiserror::Error)]
enum CheckError {
    #[error("check failed: {0}")]
    Check(String),
    #[error(transparent)]
    Harness(#[from] HarnessError),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

#[tokio::test]
async fn test_body_error_is_returned_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::test_db().await?;
    let title = unique_str("failure-err");

    let err = db
        .run(|txn| {
            let title = title.clone();
            Box::pin(async move {
                appointments::insert(txn, &title).await?;
                Err::<(), _>(CheckError::Check("expected 2 rows, got 1".into()))
            })
        })
        .await
        .unwrap_err();

    match err {
        CheckError::Check(msg) => assert_eq!(msg, "expected 2 rows, got 1"),
        other => panic!("wrong error surfaced: {other:?}"),
    }
    assert_eq!(appointments::count_titled(db.conn(), &title).await?, 0);
    Ok(())
}

#[tokio::test]
async fn test_panic_is_resumed_after_rollback() -> Result<(), Box<dyn std::error::Error>> {
    let db = common::test_db().await?;
    let title = unique_str("failure-panic");

    let caught = AssertUnwindSafe(db.run(|txn| {
        let title = title.clone();
        Box::pin(async move {
            appointments::insert(txn, &title).await?;
            if !title.is_empty() {
                panic!("boom");
            }
            Ok::<_, CheckError>(())
        })
    }))
    .catch_unwind()
    .await;

    let payload = caught.expect_err("the panic must reach the caller");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));

    // a later test on the same TestDb finds nothing
    let leaked = db
        .run(|txn| {
            let title = title.clone();
            Box::pin(async move {
                let count = appointments::count_titled(txn, &title).await?;
                Ok::<_, CheckError>(count)
            })
        })
        .await?;
    assert_eq!(leaked, 0);
    Ok(())
}

#[tokio::test]
async fn test_guard_dropped_without_rollback_releases_gate() -> Result<(), Box<dyn std::error::Error>>
{
    let db = common::test_db().await?;

    let txn = db.begin().await?;
    let first = txn.id();
    drop(txn);

    let next = db.begin().await?;
    assert!(next.id() > first);
    next.rollback().await?;
    Ok(())
}

/// SQLite reports a ROLLBACK with no open transaction as an error; Postgres
/// only warns, so these cases have nothing to observe there.
fn rollback_errors_surface(db: &TestDb) -> bool {
    db.conn().get_database_backend() == DbBackend::Sqlite
}

#[tokio::test]
async fn test_failed_rollback_after_passing_body_is_the_result(
) -> Result<(), Box<dyn std::error::Error>> {
    let db = common::test_db().await?;
    if !rollback_errors_surface(&db) {
        return Ok(());
    }

    let result = db
        .run(|txn| {
            Box::pin(async move {
                txn.execute_unprepared("ROLLBACK;").await?;
                Ok::<_, CheckError>(())
            })
        })
        .await;

    match result {
        Err(CheckError::Harness(HarnessError::Rollback { .. })) => {}
        other => panic!("expected a rollback failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_failed_rollback_after_body_error_keeps_body_error(
) -> Result<(), Box<dyn std::error::Error>> {
    let db = common::test_db().await?;
    if !rollback_errors_surface(&db) {
        return Ok(());
    }

    let err = db
        .run(|txn| {
            Box::pin(async move {
                txn.execute_unprepared("ROLLBACK;").await?;
                Err::<(), _>(CheckError::Check("body gave up".into()))
            })
        })
        .await
        .unwrap_err();

    match err {
        CheckError::Check(msg) => assert_eq!(msg, "body gave up"),
        other => panic!("rollback failure replaced the body error: {other:?}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_test_db_runs_one_transaction_at_a_time(
) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(common::test_db().await?);
    let open = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let runs = (0..4).map(|i| {
        let db = Arc::clone(&db);
        let open = Arc::clone(&open);
        let peak = Arc::clone(&peak);
        async move {
            let title = unique_str(&format!("shared-{i}"));
            db.run(|txn| {
                Box::pin(async move {
                    let now = open.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    appointments::insert(txn, &title).await?;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    open.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, CheckError>(())
                })
            })
            .await
        }
    });

    for result in join_all(runs).await {
        result?;
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(open.load(Ordering::SeqCst), 0);
    Ok(())
}
