//! The two table loads and the steps they are built from.
//!
//! [`upsert::UpsertLoader`] stages a normalized batch and merges it into the target.
//! [`swap::SwapLoader`] materializes a query into a shadow table and swaps it with the
//! target. Both run their steps inside one [`crate::transaction::TransactionCoordinator`].

use std::fmt;

use crate::types::TableName;

pub mod merge;
pub mod staging;
pub mod swap;
pub mod upsert;

/// Outcome of a committed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub target: TableName,
    /// Rows staged by an upsert, or materialized into the shadow table by a swap.
    pub rows_loaded: u64,
    /// Rows of the target table as committed, counted inside the load transaction.
    pub target_rows: u64,
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} rows loaded, {} rows in target",
            self.target, self.rows_loaded, self.target_rows
        )
    }
}
