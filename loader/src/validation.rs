use tracing::{debug, warn};

use crate::bail;
use crate::error::{DuplicateKey, ErrorKind, LoadError, LoadResult};
use crate::store::TableStore;
use crate::types::TableName;

/// Fails with [`ErrorKind::DuplicateKeyViolation`] if two rows of `table` share a key.
///
/// Runs one grouped count over `key_columns` and inspects only the largest group, so
/// the reported key is the most duplicated one. The probe never mutates the table. An
/// empty table passes.
pub async fn ensure_unique_keys<S: TableStore>(
    store: &mut S,
    table: &TableName,
    key_columns: &[String],
) -> LoadResult<()> {
    if key_columns.is_empty() {
        bail!(
            ErrorKind::InvalidState,
            "Key uniqueness check requires at least one key column",
            format!("no key columns given for {table}")
        );
    }

    let Some(group) = store.max_key_group(table, key_columns).await? else {
        debug!(%table, "table is empty, keys are trivially unique");
        return Ok(());
    };

    if group.count > 1 {
        warn!(%table, key = %group.key, count = group.count, "duplicate logical key found");

        return Err(LoadError::duplicate_key_violation(DuplicateKey {
            table: table.clone(),
            key: group.key,
            count: group.count,
        }));
    }

    debug!(%table, ?key_columns, "logical keys are unique");

    Ok(())
}
