use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use bigdecimal::{BigDecimal, RoundingMode};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, LoadResult};
use crate::store::{KeyConstraint, KeyGroup, TableStore};
use crate::types::{Cell, ColumnSchema, ColumnType, TableName, TableRow, TableSchema};

/// Operations of [`MemoryTableStore`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Begin,
    Commit,
    Rollback,
    ReplaceTable,
    ReplaceTableAs,
    CreateTableLike,
    DeleteRows,
    InsertRow,
    MergeRows,
    MaxKeyGroup,
    SwapTables,
    CountRows,
    FetchRows,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    constraint: KeyConstraint,
    rows: Vec<TableRow>,
}

impl MemoryTable {
    fn empty(schema: TableSchema, constraint: KeyConstraint) -> Self {
        Self {
            schema,
            constraint,
            rows: Vec::new(),
        }
    }

    fn key_position(&self, key: &[Cell]) -> Option<usize> {
        let indexes = self.schema.key_indexes();
        self.rows
            .iter()
            .position(|row| row.project(&indexes).as_slice() == key)
    }

    fn push(&mut self, table: &TableName, row: TableRow) -> LoadResult<()> {
        if row.values().len() != self.schema.columns.len() {
            bail!(
                ErrorKind::StoreQueryFailed,
                "Insert has the wrong number of values",
                format!(
                    "table {table} has {} columns, the row has {} values",
                    self.schema.columns.len(),
                    row.values().len()
                )
            );
        }

        let row: TableRow = row
            .into_values()
            .into_iter()
            .zip(&self.schema.columns)
            .map(|(cell, column)| conform(table, column, cell))
            .collect::<LoadResult<Vec<_>>>()?
            .into();

        for (cell, column) in row.values().iter().zip(&self.schema.columns) {
            if cell.is_null() && (!column.nullable || column.primary_key) {
                bail!(
                    ErrorKind::StoreQueryFailed,
                    "Null value violates not-null constraint",
                    format!("column `{}` of table {table}", column.name)
                );
            }
        }

        if self.constraint == KeyConstraint::Enforced && self.schema.has_key() {
            let key = row.project(&self.schema.key_indexes());
            if self.key_position(&key).is_some() {
                bail!(
                    ErrorKind::StoreQueryFailed,
                    "Duplicate key value violates unique constraint",
                    format!("key {} already exists in {table}", Cell::row_literal(&key))
                );
            }
        }

        self.rows.push(row);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct QueryResult {
    schema: TableSchema,
    rows: Vec<TableRow>,
}

type Tables = BTreeMap<TableName, MemoryTable>;

#[derive(Debug)]
struct Inner {
    /// State visible to readers.
    committed: Tables,
    /// Private copy mutated by the open transaction, if any.
    working: Option<Tables>,
    queries: HashMap<String, QueryResult>,
    failing: HashSet<StoreOperation>,
}

impl Inner {
    fn check(&self, operation: StoreOperation) -> LoadResult<()> {
        if self.failing.contains(&operation) {
            bail!(
                ErrorKind::StoreQueryFailed,
                "Injected store failure",
                format!("operation {operation:?} is configured to fail")
            );
        }

        Ok(())
    }

    /// Tables the next statement operates on: the transaction's copy when one is open,
    /// the committed state otherwise.
    fn tables(&mut self) -> &mut Tables {
        match self.working.as_mut() {
            Some(working) => working,
            None => &mut self.committed,
        }
    }
}

fn missing_table(table: &TableName) -> crate::error::LoadError {
    crate::load_error!(
        ErrorKind::StoreQueryFailed,
        "Relation does not exist",
        format!("table {table} does not exist")
    )
}

/// Stores a cell the way Postgres stores it in `column`.
///
/// Numeric values are rounded half away from zero to the column scale, and values whose
/// integer part needs more than `precision - scale` digits are rejected.
fn conform(table: &TableName, column: &ColumnSchema, cell: Cell) -> LoadResult<Cell> {
    let ColumnType::Numeric { precision, scale } = column.typ else {
        return Ok(cell);
    };

    let (value, rounded) = match cell {
        Cell::Numeric(value) => {
            let rounded = value.with_scale_round(i64::from(scale), RoundingMode::HalfUp);
            (rounded.clone(), Cell::Numeric(rounded))
        }
        Cell::I64(value) => (BigDecimal::from(value).with_scale(i64::from(scale)), Cell::I64(value)),
        other => return Ok(other),
    };

    let integer_digits = value.digits() as i64 - i64::from(scale);
    let allowed = i64::from(precision.saturating_sub(scale));
    if integer_digits > allowed {
        bail!(
            ErrorKind::StoreQueryFailed,
            "Numeric field overflow",
            format!(
                "column `{}` of table {table} is {}, value {value} does not fit",
                column.name,
                column.typ.sql_type()
            )
        );
    }

    Ok(rounded)
}

fn column_indexes(table: &TableName, schema: &TableSchema, columns: &[String]) -> LoadResult<Vec<usize>> {
    columns
        .iter()
        .map(|column| {
            schema.column_index(column).ok_or_else(|| {
                crate::load_error!(
                    ErrorKind::StoreQueryFailed,
                    "Column does not exist",
                    format!("column `{column}` does not exist in {table}")
                )
            })
        })
        .collect()
}

/// In-memory [`TableStore`] for tests and dry runs.
///
/// Transactions work on a private copy of every table, published on commit and discarded on
/// rollback, so readers using [`MemoryTableStore::committed_rows`] from another handle only
/// ever see committed state. Clones share the same tables.
///
/// `create table .. as` needs the query result registered up front with
/// [`MemoryTableStore::register_query`]; unknown queries fail like a broken statement.
#[derive(Debug, Clone)]
pub struct MemoryTableStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        let inner = Inner {
            committed: BTreeMap::new(),
            working: None,
            queries: HashMap::new(),
            failing: HashSet::new(),
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Registers the result `create table .. as {query}` materializes.
    pub async fn register_query(
        &self,
        query: impl Into<String>,
        schema: TableSchema,
        rows: Vec<TableRow>,
    ) {
        let mut inner = self.inner.lock().await;
        inner
            .queries
            .insert(query.into().trim().to_owned(), QueryResult { schema, rows });
    }

    /// Makes every later call of `operation` fail with [`ErrorKind::StoreQueryFailed`].
    pub async fn fail_on(&self, operation: StoreOperation) {
        let mut inner = self.inner.lock().await;
        inner.failing.insert(operation);
    }

    pub async fn clear_failures(&self) {
        let mut inner = self.inner.lock().await;
        inner.failing.clear();
    }

    /// Returns the committed rows of `table`, or `None` if it was never committed.
    pub async fn committed_rows(&self, table: &TableName) -> Option<Vec<TableRow>> {
        let inner = self.inner.lock().await;
        inner.committed.get(table).map(|table| table.rows.clone())
    }

    pub async fn committed_row_count(&self, table: &TableName) -> Option<u64> {
        let inner = self.inner.lock().await;
        inner.committed.get(table).map(|table| table.rows.len() as u64)
    }

    pub async fn committed_tables(&self) -> Vec<TableName> {
        let inner = self.inner.lock().await;
        inner.committed.keys().cloned().collect()
    }

    pub async fn in_transaction(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.working.is_some()
    }

    /// Creates and fills `table` outside any transaction.
    pub async fn seed_table(
        &self,
        table: &TableName,
        schema: TableSchema,
        constraint: KeyConstraint,
        rows: Vec<TableRow>,
    ) -> LoadResult<()> {
        let mut inner = self.inner.lock().await;
        let mut memory_table = MemoryTable::empty(schema, constraint);
        for row in rows {
            memory_table.push(table, row)?;
        }
        inner.committed.insert(table.clone(), memory_table);

        Ok(())
    }
}

impl Default for MemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TableStore for MemoryTableStore {
    async fn begin(&mut self) -> LoadResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::Begin)?;

        if inner.working.is_some() {
            bail!(
                ErrorKind::InvalidState,
                "A transaction is already open on this store"
            );
        }
        inner.working = Some(inner.committed.clone());

        debug!("memory transaction opened");

        Ok(())
    }

    async fn commit(&mut self) -> LoadResult<()> {
        let mut inner = self.inner.lock().await;

        let Some(working) = inner.working.take() else {
            bail!(ErrorKind::InvalidState, "No transaction is open on this store");
        };
        // A failed commit aborts the transaction, like a Postgres commit error does.
        inner.check(StoreOperation::Commit)?;
        inner.committed = working;

        debug!("memory transaction committed");

        Ok(())
    }

    async fn rollback(&mut self) -> LoadResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.working.take().is_none() {
            bail!(ErrorKind::InvalidState, "No transaction is open on this store");
        }
        inner.check(StoreOperation::Rollback)?;

        debug!("memory transaction rolled back");

        Ok(())
    }

    async fn replace_table(
        &mut self,
        table: &TableName,
        schema: &TableSchema,
        constraint: KeyConstraint,
    ) -> LoadResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::ReplaceTable)?;

        inner
            .tables()
            .insert(table.clone(), MemoryTable::empty(schema.clone(), constraint));

        info!(%table, "replaced memory table");

        Ok(())
    }

    async fn replace_table_as(&mut self, table: &TableName, query: &str) -> LoadResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::ReplaceTableAs)?;

        let Some(result) = inner.queries.get(query.trim()).cloned() else {
            bail!(
                ErrorKind::StoreQueryFailed,
                "Query has no registered result",
                format!("the memory store cannot evaluate `{}`", query.trim())
            );
        };

        let mut memory_table = MemoryTable::empty(result.schema, KeyConstraint::Unenforced);
        for row in result.rows {
            memory_table.push(table, row)?;
        }
        inner.tables().insert(table.clone(), memory_table);

        Ok(())
    }

    async fn create_table_like(&mut self, table: &TableName, template: &TableName) -> LoadResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::CreateTableLike)?;

        let tables = inner.tables();
        if tables.contains_key(table) {
            return Ok(());
        }

        let schema = tables
            .get(template)
            .map(|template| template.schema.clone())
            .ok_or_else(|| missing_table(template))?;
        tables.insert(
            table.clone(),
            MemoryTable::empty(schema, KeyConstraint::Unenforced),
        );

        Ok(())
    }

    async fn delete_rows(&mut self, table: &TableName) -> LoadResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::DeleteRows)?;

        let memory_table = inner
            .tables()
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;
        let deleted = memory_table.rows.len() as u64;
        memory_table.rows.clear();

        Ok(deleted)
    }

    async fn insert_row(
        &mut self,
        table: &TableName,
        _schema: &TableSchema,
        row: &TableRow,
    ) -> LoadResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::InsertRow)?;

        let memory_table = inner
            .tables()
            .get_mut(table)
            .ok_or_else(|| missing_table(table))?;
        memory_table.push(table, row.clone())
    }

    async fn merge_rows(
        &mut self,
        source: &TableName,
        target: &TableName,
        schema: &TableSchema,
    ) -> LoadResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::MergeRows)?;

        let tables = inner.tables();
        let source_rows = tables
            .get(source)
            .map(|table| table.rows.clone())
            .ok_or_else(|| missing_table(source))?;
        let target_table = tables.get_mut(target).ok_or_else(|| missing_table(target))?;

        if target_table.schema.column_names().ne(schema.column_names()) {
            bail!(
                ErrorKind::StoreQueryFailed,
                "Merge target does not match the load schema",
                format!("table {target} has different columns")
            );
        }

        let key_indexes = schema.key_indexes();
        let mut merged = target_table.clone();
        let mut touched = HashSet::new();

        for row in source_rows {
            let key = row.project(&key_indexes);
            match merged.key_position(&key) {
                Some(position) => {
                    if !touched.insert(position) {
                        bail!(
                            ErrorKind::StoreQueryFailed,
                            "Merge would affect a target row a second time",
                            format!("key {} appears more than once in {source}", Cell::row_literal(&key))
                        );
                    }

                    let existing = merged.rows[position].values_mut();
                    for (index, (cell, column)) in row.values().iter().zip(&schema.columns).enumerate() {
                        if !column.primary_key {
                            existing[index] = conform(target, column, cell.clone())?;
                        }
                    }
                }
                None => {
                    merged.push(target, row)?;
                    touched.insert(merged.rows.len() - 1);
                }
            }
        }

        *target_table = merged;

        Ok(touched.len() as u64)
    }

    async fn max_key_group(
        &mut self,
        table: &TableName,
        key_columns: &[String],
    ) -> LoadResult<Option<KeyGroup>> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::MaxKeyGroup)?;

        let memory_table = inner.tables().get(table).ok_or_else(|| missing_table(table))?;
        let indexes = column_indexes(table, &memory_table.schema, key_columns)?;

        let mut order = Vec::new();
        let mut counts: HashMap<Vec<Cell>, i64> = HashMap::new();
        for row in &memory_table.rows {
            let key = row.project(&indexes);
            let count = counts.entry(key.clone()).or_insert(0);
            if *count == 0 {
                order.push(key);
            }
            *count += 1;
        }

        let mut largest: Option<KeyGroup> = None;
        for key in order {
            let count = counts.get(&key).copied().unwrap_or_default();
            if largest.as_ref().is_none_or(|group| count > group.count) {
                largest = Some(KeyGroup {
                    key: Cell::row_literal(&key),
                    count,
                });
            }
        }

        Ok(largest)
    }

    async fn swap_tables(&mut self, target: &TableName, shadow: &TableName) -> LoadResult<()> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::SwapTables)?;

        let tables = inner.tables();
        let live = tables.remove(target).ok_or_else(|| missing_table(target))?;
        let Some(fresh) = tables.remove(shadow) else {
            tables.insert(target.clone(), live);
            return Err(missing_table(shadow));
        };
        tables.insert(target.clone(), fresh);
        tables.insert(shadow.clone(), live);

        info!(%target, %shadow, "swapped memory tables");

        Ok(())
    }

    async fn count_rows(&mut self, table: &TableName) -> LoadResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::CountRows)?;

        inner
            .tables()
            .get(table)
            .map(|table| table.rows.len() as u64)
            .ok_or_else(|| missing_table(table))
    }

    async fn fetch_rows(&mut self, table: &TableName, schema: &TableSchema) -> LoadResult<Vec<TableRow>> {
        let mut inner = self.inner.lock().await;
        inner.check(StoreOperation::FetchRows)?;

        let mut rows = inner
            .tables()
            .get(table)
            .map(|table| table.rows.clone())
            .ok_or_else(|| missing_table(table))?;

        let key_indexes = schema.key_indexes();
        rows.sort_by(|a, b| a.project(&key_indexes).cmp(&b.project(&key_indexes)));

        Ok(rows)
    }
}
