use config::shared::QuerySwapJobConfig;
use tracing::info;

use crate::error::LoadResult;
use crate::failpoints::{SWAP_LOAD__BEFORE_SWAP, load_fail_point};
use crate::load::LoadSummary;
use crate::store::TableStore;
use crate::transaction::TransactionCoordinator;
use crate::types::TableName;
use crate::validation::ensure_unique_keys;

/// Replaces a target table with the result of a query by swapping in a shadow table.
///
/// The query is materialized into the shadow table, its logical key (if any) is checked
/// for uniqueness, the target is created empty with the shadow's columns if missing, and
/// then the two tables exchange names inside the load transaction. Readers never see a
/// partially populated target: before commit they see the old table, after it the new one.
/// After a swap the shadow name holds the previous live data.
#[derive(Debug, Clone)]
pub struct SwapLoader {
    target: TableName,
    shadow: TableName,
    primary_key: Vec<String>,
}

impl SwapLoader {
    /// Creates a loader whose shadow table is the target's name with `temp_prefix`.
    ///
    /// An empty `primary_key` skips the uniqueness check.
    pub fn new(target: TableName, temp_prefix: &str, primary_key: Vec<String>) -> Self {
        let shadow = target.with_prefix(temp_prefix);

        Self {
            target,
            shadow,
            primary_key,
        }
    }

    pub fn from_config(config: &QuerySwapJobConfig) -> LoadResult<Self> {
        let target: TableName = config.table.target.parse()?;

        Ok(Self::new(
            target,
            &config.table.temp_prefix,
            config.primary_key.clone(),
        ))
    }

    pub fn target(&self) -> &TableName {
        &self.target
    }

    pub fn shadow(&self) -> &TableName {
        &self.shadow
    }

    pub async fn load<S: TableStore>(&self, store: &mut S, query: &str) -> LoadResult<LoadSummary> {
        info!(table = %self.target, shadow = %self.shadow, "starting swap load");

        let (rows_loaded, target_rows) = {
            let mut coordinator = TransactionCoordinator::new(&mut *store);
            coordinator.begin().await?;

            let result = match coordinator.session() {
                Ok(session) => self.run_steps(session, query).await,
                Err(err) => Err(err),
            };

            coordinator.finish(result).await?
        };

        let summary = LoadSummary {
            target: self.target.clone(),
            rows_loaded,
            target_rows,
        };

        info!(%summary, "swap load committed");

        Ok(summary)
    }

    /// Returns the materialized row count and the swapped-in target row count.
    async fn run_steps<S: TableStore>(&self, session: &mut S, query: &str) -> LoadResult<(u64, u64)> {
        session.replace_table_as(&self.shadow, query).await?;
        let materialized = session.count_rows(&self.shadow).await?;
        info!(shadow = %self.shadow, rows = materialized, "shadow table materialized");

        if !self.primary_key.is_empty() {
            ensure_unique_keys(session, &self.shadow, &self.primary_key).await?;
        }

        session.create_table_like(&self.target, &self.shadow).await?;

        load_fail_point(SWAP_LOAD__BEFORE_SWAP)?;

        session.swap_tables(&self.target, &self.shadow).await?;
        let target_rows = session.count_rows(&self.target).await?;

        Ok((materialized, target_rows))
    }
}
