use config::shared::TableLoadConfig;
use tracing::info;

use crate::error::LoadResult;
use crate::failpoints::{UPSERT_LOAD__AFTER_MERGE, load_fail_point};
use crate::load::LoadSummary;
use crate::load::merge::merge_into_target;
use crate::load::staging::stage_batch;
use crate::store::TableStore;
use crate::transaction::TransactionCoordinator;
use crate::types::{Batch, TableName};
use crate::validation::ensure_unique_keys;

/// Loads a [`Batch`] into a target table through a staging table and a merge.
///
/// One load is one transaction: stage the batch, check the staged keys are unique, merge
/// staging into the target, commit. Any failure rolls the whole load back, so readers see
/// the target either as before the load or with the full batch merged. Loading the same
/// batch twice leaves the target as after the first load.
#[derive(Debug, Clone)]
pub struct UpsertLoader {
    target: TableName,
    staging: TableName,
}

impl UpsertLoader {
    /// Creates a loader whose staging table is the target's name with `temp_prefix`.
    pub fn new(target: TableName, temp_prefix: &str) -> Self {
        let staging = target.with_prefix(temp_prefix);

        Self { target, staging }
    }

    pub fn from_config(config: &TableLoadConfig) -> LoadResult<Self> {
        let target: TableName = config.target.parse()?;

        Ok(Self::new(target, &config.temp_prefix))
    }

    pub fn target(&self) -> &TableName {
        &self.target
    }

    pub fn staging(&self) -> &TableName {
        &self.staging
    }

    pub async fn load<S: TableStore>(&self, store: &mut S, batch: &Batch) -> LoadResult<LoadSummary> {
        info!(table = %self.target, rows = batch.len(), "starting upsert load");

        let (rows_loaded, target_rows) = {
            let mut coordinator = TransactionCoordinator::new(&mut *store);
            coordinator.begin().await?;

            let result = match coordinator.session() {
                Ok(session) => self.run_steps(session, batch).await,
                Err(err) => Err(err),
            };

            coordinator.finish(result).await?
        };

        let summary = LoadSummary {
            target: self.target.clone(),
            rows_loaded,
            target_rows,
        };

        info!(%summary, "upsert load committed");

        Ok(summary)
    }

    /// Returns the staged row count and the target row count, both taken before commit.
    async fn run_steps<S: TableStore>(
        &self,
        session: &mut S,
        batch: &Batch,
    ) -> LoadResult<(u64, u64)> {
        let schema = batch.schema();
        let key_columns: Vec<String> = schema
            .key_columns()
            .map(|column| column.name.clone())
            .collect();

        let staged = stage_batch(session, batch, &self.staging, &self.target).await?;
        ensure_unique_keys(session, &self.staging, &key_columns).await?;
        merge_into_target(session, &self.staging, &self.target, schema).await?;
        let target_rows = session.count_rows(&self.target).await?;

        load_fail_point(UPSERT_LOAD__AFTER_MERGE)?;

        Ok((staged, target_rows))
    }
}
