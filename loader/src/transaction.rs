//! Begin/commit/rollback envelope around the steps of one load.

use tracing::{error, info, warn};

use crate::bail;
use crate::error::{ErrorKind, LoadResult};
use crate::store::TableStore;

/// Lifecycle of a [`TransactionCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Open,
    Committed,
    RolledBack,
}

/// Runs one load attempt inside one store transaction.
///
/// The coordinator moves `Idle -> Open -> Committed | RolledBack` exactly once. Steps
/// reach the store through [`TransactionCoordinator::session`] while the transaction is
/// open, and [`TransactionCoordinator::finish`] commits on success or rolls back and
/// hands the original error back on failure. A retry needs a fresh coordinator.
///
/// Dropping a coordinator while open leaves the rollback to the store: an uncommitted
/// Postgres transaction is rolled back when its connection is returned.
#[derive(Debug)]
pub struct TransactionCoordinator<'a, S> {
    store: &'a mut S,
    state: TransactionState,
}

impl<'a, S> TransactionCoordinator<'a, S>
where
    S: TableStore,
{
    pub fn new(store: &'a mut S) -> Self {
        Self {
            store,
            state: TransactionState::Idle,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Opens the transaction.
    ///
    /// A failed begin ends the coordinator in [`TransactionState::RolledBack`] since no
    /// transaction is left open.
    pub async fn begin(&mut self) -> LoadResult<()> {
        if self.state != TransactionState::Idle {
            bail!(
                ErrorKind::InvalidState,
                "Transaction coordinator can only begin once",
                format!("coordinator is {:?}", self.state)
            );
        }

        if let Err(err) = self.store.begin().await {
            self.state = TransactionState::RolledBack;
            return Err(err);
        }
        self.state = TransactionState::Open;

        Ok(())
    }

    /// Returns the store for the next step of the open transaction.
    pub fn session(&mut self) -> LoadResult<&mut S> {
        if self.state != TransactionState::Open {
            bail!(
                ErrorKind::InvalidState,
                "No open transaction to run a load step in",
                format!("coordinator is {:?}", self.state)
            );
        }

        Ok(&mut *self.store)
    }

    /// Closes the transaction according to `result`.
    ///
    /// On `Ok` the transaction is committed; a failed commit leaves the coordinator
    /// [`TransactionState::RolledBack`] and returns the store error. On `Err` the transaction
    /// is rolled back and the same error is returned, even if the rollback itself fails.
    pub async fn finish<T>(&mut self, result: LoadResult<T>) -> LoadResult<T> {
        if self.state != TransactionState::Open {
            bail!(
                ErrorKind::InvalidState,
                "No open transaction to finish",
                format!("coordinator is {:?}", self.state)
            );
        }

        match result {
            Ok(value) => match self.store.commit().await {
                Ok(()) => {
                    self.state = TransactionState::Committed;
                    info!("transaction committed");

                    Ok(value)
                }
                Err(err) => {
                    self.state = TransactionState::RolledBack;
                    error!(error = %err, "transaction commit failed");

                    Err(err)
                }
            },
            Err(err) => {
                error!(error = %err, "load step failed, rolling back transaction");

                if let Err(rollback_err) = self.store.rollback().await {
                    warn!(error = %rollback_err, "transaction rollback failed");
                }
                self.state = TransactionState::RolledBack;

                Err(err)
            }
        }
    }
}

impl<S> Drop for TransactionCoordinator<'_, S> {
    fn drop(&mut self) {
        if self.state == TransactionState::Open {
            warn!("transaction coordinator dropped with an open transaction");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_error;
    use crate::store::memory::{MemoryTableStore, StoreOperation};
    use crate::store::{KeyConstraint, TableStore};
    use crate::types::{Cell, ColumnSchema, ColumnType, TableName, TableRow, TableSchema};

    fn table() -> TableName {
        TableName::new("raw", "numbers")
    }

    fn schema() -> TableSchema {
        TableSchema::new(vec![ColumnSchema::key("id", ColumnType::BigInt)])
    }

    #[tokio::test]
    async fn successful_steps_commit() {
        let mut store = MemoryTableStore::new();
        let reader = store.clone();

        let mut coordinator = TransactionCoordinator::new(&mut store);
        coordinator.begin().await.unwrap();
        let session = coordinator.session().unwrap();
        session
            .replace_table(&table(), &schema(), KeyConstraint::Enforced)
            .await
            .unwrap();
        coordinator.finish(Ok(())).await.unwrap();

        assert_eq!(coordinator.state(), TransactionState::Committed);
        assert_eq!(reader.committed_row_count(&table()).await, Some(0));
    }

    #[tokio::test]
    async fn failed_step_rolls_back_and_returns_the_original_error() {
        let mut store = MemoryTableStore::new();
        store
            .seed_table(
                &table(),
                schema(),
                KeyConstraint::Enforced,
                vec![TableRow::new(vec![Cell::I64(1)])],
            )
            .await
            .unwrap();
        let reader = store.clone();

        let mut coordinator = TransactionCoordinator::new(&mut store);
        coordinator.begin().await.unwrap();
        coordinator
            .session()
            .unwrap()
            .delete_rows(&table())
            .await
            .unwrap();
        let err = coordinator
            .finish::<()>(Err(load_error!(ErrorKind::MalformedRecord, "Bad record")))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedRecord);
        assert_eq!(coordinator.state(), TransactionState::RolledBack);
        assert_eq!(reader.committed_row_count(&table()).await, Some(1));
    }

    #[tokio::test]
    async fn rollback_failure_keeps_the_original_error() {
        let mut store = MemoryTableStore::new();
        store.fail_on(StoreOperation::Rollback).await;

        let mut coordinator = TransactionCoordinator::new(&mut store);
        coordinator.begin().await.unwrap();
        let err = coordinator
            .finish::<()>(Err(load_error!(ErrorKind::StoreQueryFailed, "Merge failed")))
            .await
            .unwrap_err();

        assert_eq!(err.description(), "Merge failed");
        assert_eq!(coordinator.state(), TransactionState::RolledBack);
    }

    #[tokio::test]
    async fn commit_failure_is_returned() {
        let mut store = MemoryTableStore::new();
        store.fail_on(StoreOperation::Commit).await;

        let mut coordinator = TransactionCoordinator::new(&mut store);
        coordinator.begin().await.unwrap();
        let err = coordinator.finish(Ok(())).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StoreQueryFailed);
        assert_eq!(coordinator.state(), TransactionState::RolledBack);
    }

    #[tokio::test]
    async fn coordinator_is_not_reentrant() {
        let mut store = MemoryTableStore::new();

        let mut coordinator = TransactionCoordinator::new(&mut store);
        assert_eq!(
            coordinator.session().unwrap_err().kind(),
            ErrorKind::InvalidState
        );

        coordinator.begin().await.unwrap();
        assert_eq!(
            coordinator.begin().await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );

        coordinator.finish(Ok(())).await.unwrap();
        assert_eq!(
            coordinator.begin().await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            coordinator.finish(Ok(())).await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }
}
