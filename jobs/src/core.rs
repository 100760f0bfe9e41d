use config::shared::{DailySeriesJobConfig, JobConfig, JobsConfig, QuerySwapJobConfig, StoreConfig};
use loader::load::LoadSummary;
use loader::load::swap::SwapLoader;
use loader::load::upsert::UpsertLoader;
use loader::normalize::DailySeriesNormalizer;
use loader::store::TableStore;
use loader::store::memory::MemoryTableStore;
use loader::store::postgres::PgTableStore;
use postgres::sqlx::connect_to_database;
use tracing::{error, info, warn};

use crate::error::JobsResult;
use crate::extract::DailySeriesClient;

/// Jobs run one at a time, so one connection is enough.
const MAX_STORE_CONNECTIONS: u32 = 1;

/// Connects the configured store and runs every job in order, stopping at the first failure.
pub async fn run_jobs(config: JobsConfig) -> JobsResult<Vec<LoadSummary>> {
    match &config.store {
        StoreConfig::Postgres(connection) => {
            let pool = connect_to_database(connection, MAX_STORE_CONNECTIONS).await?;
            let mut store = PgTableStore::new(pool);
            run_jobs_on(&mut store, &config.jobs).await
        }
        StoreConfig::Memory => {
            warn!("running against the in-memory store, nothing will be persisted");
            let mut store = MemoryTableStore::new();
            run_jobs_on(&mut store, &config.jobs).await
        }
    }
}

async fn run_jobs_on<S: TableStore>(store: &mut S, jobs: &[JobConfig]) -> JobsResult<Vec<LoadSummary>> {
    let client = DailySeriesClient::new()?;
    let mut summaries = Vec::with_capacity(jobs.len());

    for (index, job) in jobs.iter().enumerate() {
        info!(job = index, kind = job.kind(), table = %job.table().target, "starting job");

        let result = match job {
            JobConfig::DailySeriesUpsert(job) => run_daily_series_upsert(store, &client, job).await,
            JobConfig::QuerySwap(job) => run_query_swap(store, job).await,
        };

        match result {
            Ok(summary) => {
                info!(job = index, %summary, "job finished");
                summaries.push(summary);
            }
            Err(err) => {
                error!(job = index, kind = job.kind(), error = %err, "job failed, stopping the run");
                return Err(err);
            }
        }
    }

    Ok(summaries)
}

async fn run_daily_series_upsert<S: TableStore>(
    store: &mut S,
    client: &DailySeriesClient,
    job: &DailySeriesJobConfig,
) -> JobsResult<LoadSummary> {
    let loader = UpsertLoader::from_config(&job.table)?;
    let document = client.fetch(job).await?;
    let batch = DailySeriesNormalizer::from_config(job).normalize(&document)?;

    Ok(loader.load(store, &batch).await?)
}

async fn run_query_swap<S: TableStore>(store: &mut S, job: &QuerySwapJobConfig) -> JobsResult<LoadSummary> {
    let loader = SwapLoader::from_config(job)?;

    Ok(loader.load(store, &job.query).await?)
}
