//! HTTP extraction of daily time series documents.

use std::time::Duration;

use config::shared::DailySeriesJobConfig;
use loader::error::{ErrorKind, LoadResult};
use loader::{bail, load_error};
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::{debug, info};

/// Source function returning one entry per trading day.
const SERIES_FUNCTION: &str = "TIME_SERIES_DAILY";

/// Top-level field the source uses to report a rejected request with a 200 status.
const SOURCE_ERROR_FIELD: &str = "Error Message";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client fetching daily series documents from the configured source.
#[derive(Debug, Clone)]
pub struct DailySeriesClient {
    client: reqwest::Client,
}

impl DailySeriesClient {
    pub fn new() -> LoadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                load_error!(
                    ErrorKind::ExtractionFailed,
                    "Failed to build the HTTP client",
                    source: err
                )
            })?;

        Ok(Self { client })
    }

    /// Fetches the series document for `job.symbol`.
    ///
    /// Transport failures, non-success statuses, undecodable bodies and source-reported
    /// errors all fail with [`ErrorKind::ExtractionFailed`]. The request URL carries the
    /// API key, so it is stripped from every reported error.
    pub async fn fetch(&self, job: &DailySeriesJobConfig) -> LoadResult<Value> {
        info!(symbol = %job.symbol, base_url = %job.base_url, "fetching daily series");

        let response = self
            .client
            .get(&job.base_url)
            .query(&series_query(job))
            .send()
            .await
            .map_err(|err| {
                load_error!(
                    ErrorKind::ExtractionFailed,
                    "Source request failed",
                    format!("request to {} failed", job.base_url),
                    source: err.without_url()
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                ErrorKind::ExtractionFailed,
                "Source returned a non-success status",
                format!("{} returned {status}", job.base_url)
            );
        }

        let document: Value = response.json().await.map_err(|err| {
            load_error!(
                ErrorKind::ExtractionFailed,
                "Source body is not valid JSON",
                source: err.without_url()
            )
        })?;

        check_source_error(&document)?;
        debug!(symbol = %job.symbol, "daily series fetched");

        Ok(document)
    }
}

fn series_query(job: &DailySeriesJobConfig) -> [(&'static str, &str); 3] {
    [
        ("function", SERIES_FUNCTION),
        ("symbol", job.symbol.as_str()),
        ("apikey", job.api_key.expose_secret().as_str()),
    ]
}

fn check_source_error(document: &Value) -> LoadResult<()> {
    if let Some(message) = document.get(SOURCE_ERROR_FIELD).and_then(Value::as_str) {
        bail!(
            ErrorKind::ExtractionFailed,
            "Source rejected the request",
            message.to_owned()
        );
    }

    Ok(())
}
