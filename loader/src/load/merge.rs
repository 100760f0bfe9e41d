use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, LoadResult};
use crate::store::TableStore;
use crate::types::{TableName, TableSchema};

/// Reconciles `staging` into `target` with one set-based merge on the key of `schema`.
///
/// Staging rows whose key exists in the target overwrite every non-key column, the
/// others are inserted, and target rows missing from staging are left alone. Running the
/// same merge twice leaves the target as after the first run.
///
/// Returns the number of target rows updated or inserted.
pub async fn merge_into_target<S: TableStore>(
    store: &mut S,
    staging: &TableName,
    target: &TableName,
    schema: &TableSchema,
) -> LoadResult<u64> {
    if !schema.has_key() {
        bail!(
            ErrorKind::InvalidState,
            "Merge requires at least one key column",
            format!("no key columns declared for {target}")
        );
    }

    let merged = store.merge_rows(staging, target, schema).await?;

    info!(%staging, %target, rows = merged, "merged staging into target");

    Ok(merged)
}
