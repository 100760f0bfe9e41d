use std::future::Future;

use crate::error::LoadResult;
use crate::types::{TableName, TableRow, TableSchema};

/// Whether a created table enforces its schema's key as a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyConstraint {
    /// The key columns form the table's primary key.
    Enforced,
    /// Key columns are `not null` but duplicates are accepted, so they can be reported by
    /// [`crate::validation::ensure_unique_keys`] instead of failing the insert.
    Unenforced,
}

/// The largest group of rows sharing one logical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGroup {
    /// The key rendered as a row literal, e.g. `(AAPL,2024-01-02)`.
    pub key: String,
    pub count: i64,
}

/// Storage system holding the staging, shadow and target tables of a load.
///
/// Each method is one step of a load. Statements issued between [`TableStore::begin`] and
/// [`TableStore::commit`] or [`TableStore::rollback`] belong to one transaction and become
/// visible to other readers only on commit. Statements issued outside a transaction
/// apply immediately.
///
/// Data values are always bound as parameters, and identifiers are always quoted.
pub trait TableStore {
    /// Opens a transaction. Fails if one is already open.
    fn begin(&mut self) -> impl Future<Output = LoadResult<()>> + Send;

    /// Commits the open transaction. Fails if none is open.
    fn commit(&mut self) -> impl Future<Output = LoadResult<()>> + Send;

    /// Discards the open transaction. Fails if none is open.
    fn rollback(&mut self) -> impl Future<Output = LoadResult<()>> + Send;

    /// Drops `table` if it exists and creates it empty with `schema`.
    fn replace_table(
        &mut self,
        table: &TableName,
        schema: &TableSchema,
        constraint: KeyConstraint,
    ) -> impl Future<Output = LoadResult<()>> + Send;

    /// Drops `table` if it exists and creates it as the materialized result of `query`.
    fn replace_table_as(
        &mut self,
        table: &TableName,
        query: &str,
    ) -> impl Future<Output = LoadResult<()>> + Send;

    /// Creates `table` empty with the columns of `template` unless it already exists.
    fn create_table_like(
        &mut self,
        table: &TableName,
        template: &TableName,
    ) -> impl Future<Output = LoadResult<()>> + Send;

    /// Deletes every row of `table` and returns how many were removed.
    fn delete_rows(&mut self, table: &TableName) -> impl Future<Output = LoadResult<u64>> + Send;

    /// Inserts one row into `table` with a single parameterized statement.
    fn insert_row(
        &mut self,
        table: &TableName,
        schema: &TableSchema,
        row: &TableRow,
    ) -> impl Future<Output = LoadResult<()>> + Send;

    /// Merges `source` into `target` on the key columns of `schema`.
    ///
    /// Matched target rows get every non-key column overwritten, unmatched source rows are
    /// inserted, and target rows absent from `source` are left untouched. Returns the number
    /// of target rows updated or inserted.
    fn merge_rows(
        &mut self,
        source: &TableName,
        target: &TableName,
        schema: &TableSchema,
    ) -> impl Future<Output = LoadResult<u64>> + Send;

    /// Returns the key of `table` with the most rows, or `None` when the table is empty.
    fn max_key_group(
        &mut self,
        table: &TableName,
        key_columns: &[String],
    ) -> impl Future<Output = LoadResult<Option<KeyGroup>>> + Send;

    /// Exchanges the contents of `target` and `shadow` by name.
    fn swap_tables(
        &mut self,
        target: &TableName,
        shadow: &TableName,
    ) -> impl Future<Output = LoadResult<()>> + Send;

    /// Returns the number of rows in `table`.
    fn count_rows(&mut self, table: &TableName) -> impl Future<Output = LoadResult<u64>> + Send;

    /// Returns every row of `table` decoded with `schema`, ordered by its key columns.
    fn fetch_rows(
        &mut self,
        table: &TableName,
        schema: &TableSchema,
    ) -> impl Future<Output = LoadResult<Vec<TableRow>>> + Send;
}
