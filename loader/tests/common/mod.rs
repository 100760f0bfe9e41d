#![allow(dead_code)]

use std::future::Future;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{Days, NaiveDate, NaiveDateTime};
use loader::error::LoadResult;
use loader::normalize::{CLOSE_FIELD, HIGH_FIELD, LOW_FIELD, OPEN_FIELD, VOLUME_FIELD};
use loader::store::memory::MemoryTableStore;
use loader::store::{KeyConstraint, KeyGroup, TableStore};
use loader::types::{Cell, ColumnSchema, ColumnType, TableName, TableRow, TableSchema};
use serde_json::{Map, Value, json};

pub const SERIES_KEY: &str = "Time Series (Daily)";

pub fn date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("test dates are valid")
}

pub fn decimal(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).expect("test decimals are valid")
}

/// Builds a daily series document with `days` entries, newest first like the real feed,
/// starting at `newest`. Each entry's close price is `close`.
pub fn series_document(newest: NaiveDate, days: u64, close: &str) -> Value {
    let mut series = Map::new();
    for offset in 0..days {
        let day = newest
            .checked_sub_days(Days::new(offset))
            .expect("test dates stay in range");
        series.insert(day.format("%Y-%m-%d").to_string(), series_entry(close));
    }

    json!({ SERIES_KEY: Value::Object(series) })
}

pub fn series_entry(close: &str) -> Value {
    json!({
        OPEN_FIELD: "187.15",
        HIGH_FIELD: "188.44",
        LOW_FIELD: "183.88",
        CLOSE_FIELD: close,
        VOLUME_FIELD: "82488674"
    })
}

pub fn stock_row(symbol: &str, day: &str, close: &str) -> TableRow {
    TableRow::new(vec![
        Cell::from(symbol),
        Cell::Numeric(decimal("187.15")),
        Cell::Numeric(decimal(close)),
        Cell::Numeric(decimal("188.44")),
        Cell::Numeric(decimal("183.88")),
        Cell::I64(82488674),
        Cell::Date(date(day)),
    ])
}

pub fn session_summary_schema() -> TableSchema {
    TableSchema::new(vec![
        ColumnSchema::value("user_id", ColumnType::Text),
        ColumnSchema::value("session_id", ColumnType::Text),
        ColumnSchema::value("channel", ColumnType::Text),
        ColumnSchema::value("ts", ColumnType::Timestamp),
    ])
}

pub fn session_row(user_id: &str, session_id: &str, channel: &str, ts: &str) -> TableRow {
    let ts = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").expect("test timestamps are valid");

    TableRow::new(vec![
        Cell::from(user_id),
        Cell::from(session_id),
        Cell::from(channel),
        Cell::Timestamp(ts),
    ])
}

/// What a reader outside the load transaction sees of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Rows(u64),
    Missing,
    /// The read waited on a lock held by the load; it would see the committed result.
    Blocked,
}

/// Read access to committed state, from outside the transaction of a load.
pub trait CommittedView {
    fn committed_count(&self, table: &TableName) -> impl Future<Output = Observation> + Send;
}

impl CommittedView for MemoryTableStore {
    async fn committed_count(&self, table: &TableName) -> Observation {
        match self.committed_row_count(table).await {
            Some(count) => Observation::Rows(count),
            None => Observation::Missing,
        }
    }
}

/// Wraps a store and records what an outside reader sees of `watched` after every step.
pub struct ObservedStore<S, V> {
    inner: S,
    view: V,
    watched: TableName,
    observations: Vec<Observation>,
}

impl<S, V> ObservedStore<S, V>
where
    S: TableStore + Send,
    V: CommittedView + Send + Sync,
{
    pub fn new(inner: S, view: V, watched: TableName) -> Self {
        Self {
            inner,
            view,
            watched,
            observations: Vec::new(),
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    async fn observe(&mut self) {
        let observation = self.view.committed_count(&self.watched).await;
        self.observations.push(observation);
    }
}

impl<S, V> TableStore for ObservedStore<S, V>
where
    S: TableStore + Send,
    V: CommittedView + Send + Sync,
{
    async fn begin(&mut self) -> LoadResult<()> {
        let result = self.inner.begin().await;
        self.observe().await;
        result
    }

    async fn commit(&mut self) -> LoadResult<()> {
        let result = self.inner.commit().await;
        self.observe().await;
        result
    }

    async fn rollback(&mut self) -> LoadResult<()> {
        let result = self.inner.rollback().await;
        self.observe().await;
        result
    }

    async fn replace_table(
        &mut self,
        table: &TableName,
        schema: &TableSchema,
        constraint: KeyConstraint,
    ) -> LoadResult<()> {
        let result = self.inner.replace_table(table, schema, constraint).await;
        self.observe().await;
        result
    }

    async fn replace_table_as(&mut self, table: &TableName, query: &str) -> LoadResult<()> {
        let result = self.inner.replace_table_as(table, query).await;
        self.observe().await;
        result
    }

    async fn create_table_like(&mut self, table: &TableName, template: &TableName) -> LoadResult<()> {
        let result = self.inner.create_table_like(table, template).await;
        self.observe().await;
        result
    }

    async fn delete_rows(&mut self, table: &TableName) -> LoadResult<u64> {
        let result = self.inner.delete_rows(table).await;
        self.observe().await;
        result
    }

    async fn insert_row(
        &mut self,
        table: &TableName,
        schema: &TableSchema,
        row: &TableRow,
    ) -> LoadResult<()> {
        let result = self.inner.insert_row(table, schema, row).await;
        self.observe().await;
        result
    }

    async fn merge_rows(
        &mut self,
        source: &TableName,
        target: &TableName,
        schema: &TableSchema,
    ) -> LoadResult<u64> {
        let result = self.inner.merge_rows(source, target, schema).await;
        self.observe().await;
        result
    }

    async fn max_key_group(
        &mut self,
        table: &TableName,
        key_columns: &[String],
    ) -> LoadResult<Option<KeyGroup>> {
        let result = self.inner.max_key_group(table, key_columns).await;
        self.observe().await;
        result
    }

    async fn swap_tables(&mut self, target: &TableName, shadow: &TableName) -> LoadResult<()> {
        let result = self.inner.swap_tables(target, shadow).await;
        self.observe().await;
        result
    }

    async fn count_rows(&mut self, table: &TableName) -> LoadResult<u64> {
        let result = self.inner.count_rows(table).await;
        self.observe().await;
        result
    }

    async fn fetch_rows(&mut self, table: &TableName, schema: &TableSchema) -> LoadResult<Vec<TableRow>> {
        let result = self.inner.fetch_rows(table, schema).await;
        self.observe().await;
        result
    }
}
