use futures::future::BoxFuture;
use sea_orm::{DatabaseTransaction, TransactionTrait};
use tracing::warn;

use crate::error::AppError;

/// Execute a function within a database transaction.
///
/// Begins on whatever `conn` is, commits on `Ok`, rolls back on `Err`. When
/// `conn` is itself a transaction (a test transaction, for instance) the
/// begin opens a savepoint and the commit only releases it, so the outer
/// transaction still decides whether anything persists.
pub async fn with_txn<C, R, F>(conn: &C, f: F) -> Result<R, AppError>
where
    C: TransactionTrait,
    F: for<'t> FnOnce(&'t DatabaseTransaction) -> BoxFuture<'t, Result<R, AppError>>,
{
    let txn = conn.begin().await?;

    match f(&txn).await {
        Ok(val) => {
            txn.commit().await?;
            Ok(val)
        }
        Err(err) => {
            // Best-effort rollback; preserve original error
            if let Err(e) = txn.rollback().await {
                warn!("with_txn=rollback_failed error={}", e);
            }
            Err(err)
        }
    }
}
