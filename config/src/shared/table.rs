use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

const fn default_retention_count() -> usize {
    RetentionConfig::DEFAULT_COUNT
}

fn default_temp_prefix() -> String {
    TableLoadConfig::DEFAULT_TEMP_PREFIX.to_owned()
}

/// Where a load lands and how its ephemeral tables are named.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableLoadConfig {
    /// Fully-qualified target table, `database.schema.table` or `schema.table`.
    pub target: String,
    /// Prefix turning the target table name into its staging or shadow table name.
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,
}

impl TableLoadConfig {
    pub const DEFAULT_TEMP_PREFIX: &'static str = "temp_";

    pub fn validate(&self) -> Result<(), ValidationError> {
        let parts = self.target.split('.').count();
        if self.target.trim().is_empty() || !(2..=3).contains(&parts) {
            return Err(ValidationError::InvalidFieldValue {
                field: "table.target".to_string(),
                constraint: "must be `database.schema.table` or `schema.table`".to_string(),
            });
        }

        if self.temp_prefix.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "table.temp_prefix".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Order in which source periods are considered when applying the retention cutoff.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetentionOrder {
    /// Keep the first entries in the order the source document lists them.
    #[default]
    SourceOrder,
    /// Sort entries by period, newest first, before cutting.
    MostRecent,
}

/// How many source periods a normalized batch keeps.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetentionConfig {
    #[serde(default = "default_retention_count")]
    pub count: usize,
    #[serde(default)]
    pub order: RetentionOrder,
}

impl RetentionConfig {
    pub const DEFAULT_COUNT: usize = 90;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "retention.count".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            count: default_retention_count(),
            order: RetentionOrder::default(),
        }
    }
}
