use secrecy::SecretString;
use serde::Deserialize;

use crate::Config;
use crate::shared::{PgConnectionConfig, RetentionConfig, TableLoadConfig, ValidationError};

fn default_base_url() -> String {
    DailySeriesJobConfig::DEFAULT_BASE_URL.to_owned()
}

fn default_series_key() -> String {
    DailySeriesJobConfig::DEFAULT_SERIES_KEY.to_owned()
}

/// Complete configuration of the `jobs` binary.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid leaking secrets.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Store holding the target tables.
    pub store: StoreConfig,
    /// Jobs run in order; the first failure stops the run.
    pub jobs: Vec<JobConfig>,
}

impl JobsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.jobs.is_empty() {
            return Err(ValidationError::NoJobsConfigured);
        }

        if let StoreConfig::Postgres(connection) = &self.store {
            connection.validate()?;
        }

        for job in &self.jobs {
            job.validate()?;
        }

        Ok(())
    }
}

impl Config for JobsConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

/// Store backing the loads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreConfig {
    Postgres(PgConnectionConfig),
    /// In-process store, useful for dry runs of extraction and normalization.
    Memory,
}

/// One load job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobConfig {
    /// Fetches a daily time series over HTTP and upserts it into the target.
    DailySeriesUpsert(DailySeriesJobConfig),
    /// Materializes a query into a shadow table and swaps it with the target.
    QuerySwap(QuerySwapJobConfig),
}

impl JobConfig {
    /// Returns the job kind as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            JobConfig::DailySeriesUpsert(_) => "daily_series_upsert",
            JobConfig::QuerySwap(_) => "query_swap",
        }
    }

    pub fn table(&self) -> &TableLoadConfig {
        match self {
            JobConfig::DailySeriesUpsert(job) => &job.table,
            JobConfig::QuerySwap(job) => &job.table,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            JobConfig::DailySeriesUpsert(job) => job.validate(),
            JobConfig::QuerySwap(job) => job.validate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailySeriesJobConfig {
    /// Endpoint queried with `function=TIME_SERIES_DAILY`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Entity the series belongs to; stored in every row's `symbol` column.
    pub symbol: String,
    pub api_key: SecretString,
    /// Top-level key of the document holding the per-period entries.
    #[serde(default = "default_series_key")]
    pub series_key: String,
    #[serde(default)]
    pub retention: RetentionConfig,
    pub table: TableLoadConfig,
}

impl DailySeriesJobConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://www.alphavantage.co/query";

    pub const DEFAULT_SERIES_KEY: &'static str = "Time Series (Daily)";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "symbol".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        self.retention.validate()?;
        self.table.validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuerySwapJobConfig {
    /// Defining `select` of the new table contents.
    pub query: String,
    /// Logical key verified unique before the swap. Empty skips the check.
    #[serde(default)]
    pub primary_key: Vec<String>,
    pub table: TableLoadConfig,
}

impl QuerySwapJobConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.query.trim().is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "query".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        self.table.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "store": "memory",
        "jobs": [
            {
                "daily_series_upsert": {
                    "symbol": "AAPL",
                    "api_key": "demo",
                    "table": { "target": "dev.raw.stock_data" }
                }
            },
            {
                "query_swap": {
                    "query": "select 1 as session_id",
                    "primary_key": ["session_id"],
                    "table": { "target": "dev.analytics.session_summary" }
                }
            }
        ]
    }"#;

    #[test]
    fn deserializes_both_job_kinds_with_defaults() {
        let config: JobsConfig = serde_json::from_str(SAMPLE).unwrap();

        assert!(matches!(config.store, StoreConfig::Memory));
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].kind(), "daily_series_upsert");
        assert_eq!(config.jobs[1].kind(), "query_swap");

        let JobConfig::DailySeriesUpsert(job) = &config.jobs[0] else {
            panic!("expected a daily series job");
        };
        assert_eq!(job.base_url, DailySeriesJobConfig::DEFAULT_BASE_URL);
        assert_eq!(job.series_key, "Time Series (Daily)");
        assert_eq!(job.retention.count, 90);
        assert_eq!(job.table.temp_prefix, "temp_");

        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_job_list_is_rejected() {
        let config: JobsConfig = serde_json::from_str(r#"{"store": "memory", "jobs": []}"#).unwrap();

        assert_eq!(config.validate(), Err(ValidationError::NoJobsConfigured));
    }
}
