use std::ops::Deref;
use std::time::Instant;

use sea_orm::DatabaseTransaction;
use tokio::sync::MutexGuard;
use tracing::{debug, warn};

use crate::error::HarnessError;

/// An open test transaction.
///
/// There is no way to commit through this type: the only exit is
/// [`TestTxn::rollback`]. Dropping it while still open logs a warning and
/// leaves the abort to sea-orm's drop-time rollback.
///
/// Holding a `TestTxn` also holds its [`TestDb`](crate::TestDb)'s gate, so
/// at most one test transaction per `TestDb` is open at any time.
pub struct TestTxn<'db> {
    id: u64,
    txn: DatabaseTransaction,
    opened_at: Instant,
    marker: OpenMarker,
    permit: MutexGuard<'db, ()>,
}

struct OpenMarker {
    id: u64,
    open: bool,
}

impl Drop for OpenMarker {
    fn drop(&mut self) {
        if self.open {
            warn!(
                "test_txn=dropped_open id={} action=implicit_rollback",
                self.id
            );
        }
    }
}

impl<'db> TestTxn<'db> {
    pub(crate) fn new(id: u64, txn: DatabaseTransaction, permit: MutexGuard<'db, ()>) -> Self {
        Self {
            id,
            txn,
            opened_at: Instant::now(),
            marker: OpenMarker { id, open: true },
            permit,
        }
    }

    /// Process-unique id, used to correlate log lines.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn transaction(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Abort the transaction, discarding everything written through it.
    pub async fn rollback(self) -> Result<(), HarnessError> {
        let TestTxn {
            id,
            txn,
            opened_at,
            mut marker,
            permit,
        } = self;
        marker.open = false;

        let result = txn.rollback().await;
        // release the gate only once the abort has reached the database
        drop(permit);

        match result {
            Ok(()) => {
                debug!(
                    "test_txn=rollback id={} open_ms={}",
                    id,
                    opened_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(source) => Err(HarnessError::Rollback { id, source }),
        }
    }
}

impl Deref for TestTxn<'_> {
    type Target = DatabaseTransaction;

    fn deref(&self) -> &Self::Target {
        &self.txn
    }
}
