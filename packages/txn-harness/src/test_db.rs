use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use db_infra::{bootstrap_test_db, ConnectionError, DbConfig};
use futures::future::BoxFuture;
use futures::FutureExt;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::error::HarnessError;
use crate::guard::TestTxn;

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// The connection shared by a sequence of tests.
///
/// Pass it explicitly to whatever runs the tests; nothing here is global.
pub struct TestDb {
    conn: DatabaseConnection,
    label: String,
    gate: Mutex<()>,
}

impl TestDb {
    /// Open the pool and apply the configured schema policy. Any failure is
    /// fatal for the run that asked for it.
    pub async fn connect(config: &DbConfig) -> Result<Self, ConnectionError> {
        let conn = bootstrap_test_db(config).await?;
        Ok(Self::labelled(conn, config.describe()))
    }

    /// [`TestDb::connect`] with the record read from `.env.test` and the
    /// process environment.
    pub async fn from_env() -> Result<Self, ConnectionError> {
        let config = DbConfig::load(None)?;
        Self::connect(&config).await
    }

    /// Adopt a pool that was opened elsewhere. The schema is not checked.
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        let label = format!("{:?}", conn.get_database_backend());
        Self::labelled(conn, label)
    }

    fn labelled(conn: DatabaseConnection, label: String) -> Self {
        Self {
            conn,
            label,
            gate: Mutex::new(()),
        }
    }

    /// The pool itself, for reads that must happen outside any test
    /// transaction.
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Open a test transaction, waiting for any other one on this `TestDb`
    /// to finish first.
    ///
    /// Calling this again while a `TestTxn` from the same `TestDb` is held by
    /// the same task never completes.
    pub async fn begin(&self) -> Result<TestTxn<'_>, HarnessError> {
        let permit = self.gate.lock().await;
        let id = NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed);

        let txn = self
            .conn
            .begin()
            .await
            .map_err(|source| HarnessError::Begin { id, source })?;

        debug!("test_txn=begin id={} db={}", id, self.label);
        Ok(TestTxn::new(id, txn, permit))
    }

    /// Wrap one test: begin, run `test` to completion, roll back.
    ///
    /// The rollback happens on every exit path. The body's own `Err` comes
    /// back unchanged and a panic is resumed with its original payload, both
    /// after the rollback. A rollback failure is only reported as the result
    /// when the body itself succeeded.
    ///
    /// ```no_run
    /// # use txn_harness::{HarnessError, TestDb};
    /// # use sea_orm::ConnectionTrait;
    /// # async fn demo(db: &TestDb) -> Result<(), HarnessError> {
    /// db.run(|txn| {
    ///     Box::pin(async move {
    ///         txn.execute_unprepared("DELETE FROM appointments;").await?;
    ///         Ok::<_, HarnessError>(())
    ///     })
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run<R, E, F>(&self, test: F) -> Result<R, E>
    where
        F: for<'t> FnOnce(&'t DatabaseTransaction) -> BoxFuture<'t, Result<R, E>>,
        E: From<HarnessError>,
    {
        let txn = self.begin().await.map_err(E::from)?;
        let id = txn.id();

        let outcome = AssertUnwindSafe(test(txn.transaction()))
            .catch_unwind()
            .await;
        let rolled_back = txn.rollback().await;

        match outcome {
            Ok(Ok(value)) => {
                rolled_back.map_err(E::from)?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if let Err(e) = rolled_back {
                    warn!(
                        "test_txn=rollback_failed id={} after=body_error error={}",
                        id, e
                    );
                }
                debug!("test_txn=body_error id={}", id);
                Err(err)
            }
            Err(payload) => {
                if let Err(e) = rolled_back {
                    error!(
                        "test_txn=rollback_failed id={} after=body_panic error={}",
                        id, e
                    );
                }
                debug!("test_txn=body_panic id={}", id);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Close the pool explicitly instead of at drop.
    pub async fn close(self) -> Result<(), HarnessError> {
        self.conn.close().await?;
        Ok(())
    }
}

impl fmt::Debug for TestDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestDb")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
