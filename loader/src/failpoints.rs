//! Named failpoints of the load paths. They compile to no-ops without the `failpoints` feature.
#![cfg_attr(not(feature = "failpoints"), allow(unused))]

use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, LoadResult};

/// Fires after the merge statement ran and before the upsert transaction commits.
pub const UPSERT_LOAD__AFTER_MERGE: &str = "upsert_load.after_merge";
/// Fires after the shadow table was validated and before the renames run.
pub const SWAP_LOAD__BEFORE_SWAP: &str = "swap_load.before_swap";

/// Returns an error when the failpoint `name` is configured with `return`.
///
/// Without the `failpoints` feature this is a no-op.
pub fn load_fail_point(name: &str) -> LoadResult<()> {
    fail_point!(name, |parameter: Option<String>| {
        let kind = match parameter.as_deref() {
            Some("store") => ErrorKind::StoreQueryFailed,
            _ => ErrorKind::InjectedFailure,
        };

        bail!(
            kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
