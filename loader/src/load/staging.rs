use tracing::{debug, info};

use crate::error::LoadResult;
use crate::store::{KeyConstraint, TableStore};
use crate::types::{Batch, TableName};

/// Writes `batch` as a full-refresh snapshot into `staging`.
///
/// Both tables are dropped and redefined with the batch schema, emptied, and then every
/// row is inserted into `staging` with its own parameterized statement. The target keeps
/// its primary key; staging does not, so duplicate keys in the batch reach the uniqueness
/// check instead of failing an insert. Inside the load transaction the target is empty
/// until the merge refills it.
///
/// Returns the number of staged rows.
pub async fn stage_batch<S: TableStore>(
    store: &mut S,
    batch: &Batch,
    staging: &TableName,
    target: &TableName,
) -> LoadResult<u64> {
    let schema = batch.schema();

    store
        .replace_table(target, schema, KeyConstraint::Enforced)
        .await?;
    store
        .replace_table(staging, schema, KeyConstraint::Unenforced)
        .await?;

    store.delete_rows(target).await?;
    store.delete_rows(staging).await?;

    for row in batch.rows() {
        store.insert_row(staging, schema, row).await?;
    }

    debug!(%staging, %target, "staging tables prepared");
    info!(%staging, rows = batch.len(), "batch staged");

    Ok(batch.len() as u64)
}
