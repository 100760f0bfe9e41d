//! Load jobs binary.
//!
//! Runs every configured job once, in order, and exits. A failing job stops the run and
//! the process exits with a non-zero status so the scheduler marks the run failed.

use config::shared::JobsConfig;
use config::{Environment, load_config};
use telemetry::tracing::init_tracing;
use tracing::{error, info};

use crate::core::run_jobs;
use crate::error::{JobsError, JobsResult};

mod core;
mod error;
mod extract;

fn main() -> JobsResult<()> {
    let jobs_config = load_config::<JobsConfig>().map_err(JobsError::config)?;
    jobs_config.validate().map_err(JobsError::config)?;

    let environment = Environment::load()?;
    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME"), environment).map_err(JobsError::config)?;

    // sqlx and reqwest both link rustls; pin the provider before either opens a connection.
    let _ = rustls::crypto::ring::default_provider().install_default();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(jobs_config))
}

async fn async_main(jobs_config: JobsConfig) -> JobsResult<()> {
    let job_count = jobs_config.jobs.len();

    match run_jobs(jobs_config).await {
        Ok(summaries) => {
            info!(jobs = job_count, loaded = summaries.len(), "all jobs finished");
            Ok(())
        }
        Err(err) => {
            error!("{err}");
            eprint!("{}", err.render_report());
            Err(err)
        }
    }
}
