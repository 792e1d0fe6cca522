//! Unit-of-work boundary over a single Postgres transaction

use std::panic::AssertUnwindSafe;

use futures_util::{future::BoxFuture, FutureExt};
use sqlx::{PgConnection, PgPool};

use crate::error::AppResult;

/// Runs callbacks inside one database transaction.
///
/// The callback receives the only connection of the transaction; nested
/// transactions are not supported, so every write of a unit of work must go
/// through that connection.
#[derive(Clone)]
pub struct TxManager {
    pool: PgPool,
}

impl TxManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Begin a transaction, run `callback` and commit if it succeeds.
    ///
    /// An error from the callback rolls back and is returned as is. A panic,
    /// raised either by the callback itself or by the future it returns,
    /// rolls back and resumes unwinding. If the returned future is dropped
    /// before completion the transaction is dropped too, which rolls it back
    /// when the connection returns to the pool.
    pub async fn with_tx<T, F>(&self, callback: F) -> AppResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, AppResult<T>> + Send,
    {
        let mut tx = self.pool.begin().await?;
        tracing::debug!("Transaction started");

        // A panic while building the future counts as a panic of the callback
        let conn: &mut PgConnection = &mut tx;
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(move || callback(conn))) {
            Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
            Err(panic) => Err(panic),
        };

        match outcome {
            Ok(Ok(value)) => {
                // A failed commit leaves the transaction open; dropping it rolls back
                tx.commit().await?;
                tracing::debug!("Transaction committed");
                Ok(value)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Rolling back transaction");
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!(error = %rollback_error, "Failed to roll back transaction");
                }
                Err(e)
            }
            Err(panic) => {
                tracing::error!("Transaction callback panicked, rolling back");
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::error!(error = %rollback_error, "Failed to roll back transaction");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}
