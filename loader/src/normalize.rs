//! Turns a daily time-series document into a typed [`Batch`].
//!
//! The document maps each period (a `YYYY-MM-DD` date) to an object of string fields:
//!
//! ```json
//! {"Time Series (Daily)": {"2024-01-02": {"1. open": "187.15", "2. high": "188.44",
//!   "3. low": "183.88", "4. close": "185.64", "5. volume": "82488674"}}}
//! ```

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use config::shared::{DailySeriesJobConfig, RetentionConfig, RetentionOrder};
use serde_json::{Map, Value};
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, LoadResult};
use crate::load_error;
use crate::types::{Batch, Cell, ColumnSchema, ColumnType, TableRow, TableSchema};

pub const OPEN_FIELD: &str = "1. open";
pub const HIGH_FIELD: &str = "2. high";
pub const LOW_FIELD: &str = "3. low";
pub const CLOSE_FIELD: &str = "4. close";
pub const VOLUME_FIELD: &str = "5. volume";

const DATE_FORMAT: &str = "%Y-%m-%d";

const PRICE_TYPE: ColumnType = ColumnType::Numeric {
    precision: 10,
    scale: 2,
};

/// Schema of the rows produced by [`DailySeriesNormalizer`], keyed by `(symbol, date)`.
pub fn stock_price_schema() -> TableSchema {
    TableSchema::new(vec![
        ColumnSchema::key("symbol", ColumnType::Text),
        ColumnSchema::value("open", PRICE_TYPE),
        ColumnSchema::value("close", PRICE_TYPE),
        ColumnSchema::value("high", PRICE_TYPE),
        ColumnSchema::value("low", PRICE_TYPE),
        ColumnSchema::value("volume", ColumnType::BigInt),
        ColumnSchema::key("date", ColumnType::Date),
    ])
}

/// Flattens the periods of one series document into rows of [`stock_price_schema`].
#[derive(Debug, Clone)]
pub struct DailySeriesNormalizer {
    symbol: String,
    series_key: String,
    retention: RetentionConfig,
}

impl DailySeriesNormalizer {
    pub fn new(symbol: impl Into<String>, series_key: impl Into<String>, retention: RetentionConfig) -> Self {
        Self {
            symbol: symbol.into(),
            series_key: series_key.into(),
            retention,
        }
    }

    pub fn from_config(config: &DailySeriesJobConfig) -> Self {
        Self::new(
            config.symbol.clone(),
            config.series_key.clone(),
            config.retention.clone(),
        )
    }

    /// Normalizes `document` into a batch of at most `retention.count` rows.
    ///
    /// Periods are taken in the document's own order, or newest first when the retention
    /// order is [`RetentionOrder::MostRecent`]. Any missing or unparsable field fails the
    /// whole document with [`ErrorKind::MalformedRecord`].
    pub fn normalize(&self, document: &Value) -> LoadResult<Batch> {
        if self.retention.count == 0 {
            bail!(
                ErrorKind::ConfigError,
                "Retention count must be greater than zero"
            );
        }

        let Some(series) = document.get(&self.series_key) else {
            bail!(
                ErrorKind::MalformedRecord,
                "Series key missing from source document",
                format!("no `{}` entry in the document", self.series_key)
            );
        };
        let Some(series) = series.as_object() else {
            bail!(
                ErrorKind::MalformedRecord,
                "Series entry is not an object",
                format!("`{}` holds {}", self.series_key, json_type(series))
            );
        };

        let entries = self.retained_entries(series)?;
        let rows = entries
            .into_iter()
            .map(|(date, fields)| self.normalize_entry(date, fields))
            .collect::<LoadResult<Vec<_>>>()?;

        debug!(
            symbol = %self.symbol,
            periods = series.len(),
            retained = rows.len(),
            "normalized series"
        );

        Batch::new(stock_price_schema(), rows)
    }

    fn retained_entries<'a>(&self, series: &'a Map<String, Value>) -> LoadResult<Vec<(NaiveDate, &'a Value)>> {
        let count = self.retention.count;

        match self.retention.order {
            RetentionOrder::SourceOrder => series
                .iter()
                .take(count)
                .map(|(period, fields)| Ok((parse_date(period)?, fields)))
                .collect(),
            RetentionOrder::MostRecent => {
                let mut entries = series
                    .iter()
                    .map(|(period, fields)| Ok((parse_date(period)?, fields)))
                    .collect::<LoadResult<Vec<_>>>()?;
                entries.sort_by(|(a, _), (b, _)| b.cmp(a));
                entries.truncate(count);

                Ok(entries)
            }
        }
    }

    fn normalize_entry(&self, date: NaiveDate, fields: &Value) -> LoadResult<TableRow> {
        let Some(fields) = fields.as_object() else {
            bail!(
                ErrorKind::MalformedRecord,
                "Series entry is not an object",
                format!("entry {date} holds {}", json_type(fields))
            );
        };

        let values = vec![
            Cell::String(self.symbol.clone()),
            Cell::Numeric(decimal_field(fields, OPEN_FIELD, date)?),
            Cell::Numeric(decimal_field(fields, CLOSE_FIELD, date)?),
            Cell::Numeric(decimal_field(fields, HIGH_FIELD, date)?),
            Cell::Numeric(decimal_field(fields, LOW_FIELD, date)?),
            Cell::I64(integer_field(fields, VOLUME_FIELD, date)?),
            Cell::Date(date),
        ];

        Ok(TableRow::new(values))
    }
}

fn parse_date(period: &str) -> LoadResult<NaiveDate> {
    NaiveDate::parse_from_str(period.trim(), DATE_FORMAT).map_err(|err| {
        load_error!(
            ErrorKind::MalformedRecord,
            "Period is not a calendar date",
            format!("period `{period}` does not match {DATE_FORMAT}"),
            source: err
        )
    })
}

/// Returns the text of a field, accepting JSON numbers as well as strings.
fn field_text(fields: &Map<String, Value>, name: &str, date: NaiveDate) -> LoadResult<String> {
    match fields.get(name) {
        Some(Value::String(text)) => Ok(text.trim().to_owned()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(other) => Err(load_error!(
            ErrorKind::MalformedRecord,
            "Field has an unexpected type",
            format!("field `{name}` of entry {date} holds {}", json_type(other))
        )),
        None => Err(load_error!(
            ErrorKind::MalformedRecord,
            "Required field missing",
            format!("field `{name}` missing in entry {date}")
        )),
    }
}

fn decimal_field(fields: &Map<String, Value>, name: &str, date: NaiveDate) -> LoadResult<BigDecimal> {
    let text = field_text(fields, name, date)?;

    BigDecimal::from_str(&text).map_err(|err| {
        load_error!(
            ErrorKind::MalformedRecord,
            "Field is not a decimal",
            format!("field `{name}` of entry {date} is `{text}`"),
            source: err
        )
    })
}

fn integer_field(fields: &Map<String, Value>, name: &str, date: NaiveDate) -> LoadResult<i64> {
    let text = field_text(fields, name, date)?;

    text.parse::<i64>().map_err(|err| {
        load_error!(
            ErrorKind::MalformedRecord,
            "Field is not an integer",
            format!("field `{name}` of entry {date} is `{text}`"),
            source: err
        )
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
