use pg_escape::quote_identifier;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, LoadResult};
use crate::store::{KeyConstraint, KeyGroup, TableStore};
use crate::types::{Cell, ColumnType, TableName, TableRow, TableSchema};

/// Suffix of the scratch name the target passes through while two tables swap names.
const SWAP_SCRATCH_SUFFIX: &str = "_swap_scratch";

/// [`TableStore`] backed by a Postgres database.
///
/// Between [`TableStore::begin`] and its commit or rollback every statement runs on one
/// pooled connection inside one transaction. An open transaction that is dropped, for
/// example because the load future was cancelled, is rolled back by the pool.
///
/// Merging uses `merge into`, which needs Postgres 15 or later.
pub struct PgTableStore {
    pool: PgPool,
    transaction: Option<Transaction<'static, Postgres>>,
}

impl PgTableStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transaction: None,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn execute(&mut self, sql: &str) -> LoadResult<u64> {
        debug!(%sql, "executing statement");

        let result = match self.transaction.as_mut() {
            Some(transaction) => sqlx::query(sql).execute(&mut **transaction).await?,
            None => sqlx::query(sql).execute(&self.pool).await?,
        };

        Ok(result.rows_affected())
    }

    async fn fetch_optional(&mut self, sql: &str) -> LoadResult<Option<PgRow>> {
        debug!(%sql, "executing query");

        let row = match self.transaction.as_mut() {
            Some(transaction) => sqlx::query(sql).fetch_optional(&mut **transaction).await?,
            None => sqlx::query(sql).fetch_optional(&self.pool).await?,
        };

        Ok(row)
    }

    async fn fetch_all(&mut self, sql: &str) -> LoadResult<Vec<PgRow>> {
        debug!(%sql, "executing query");

        let rows = match self.transaction.as_mut() {
            Some(transaction) => sqlx::query(sql).fetch_all(&mut **transaction).await?,
            None => sqlx::query(sql).fetch_all(&self.pool).await?,
        };

        Ok(rows)
    }
}

impl TableStore for PgTableStore {
    async fn begin(&mut self) -> LoadResult<()> {
        if self.transaction.is_some() {
            bail!(
                ErrorKind::InvalidState,
                "A transaction is already open on this store"
            );
        }

        self.transaction = Some(self.pool.begin().await?);

        Ok(())
    }

    async fn commit(&mut self) -> LoadResult<()> {
        let Some(transaction) = self.transaction.take() else {
            bail!(ErrorKind::InvalidState, "No transaction is open on this store");
        };

        transaction.commit().await?;

        Ok(())
    }

    async fn rollback(&mut self) -> LoadResult<()> {
        let Some(transaction) = self.transaction.take() else {
            bail!(ErrorKind::InvalidState, "No transaction is open on this store");
        };

        transaction.rollback().await?;

        Ok(())
    }

    async fn replace_table(
        &mut self,
        table: &TableName,
        schema: &TableSchema,
        constraint: KeyConstraint,
    ) -> LoadResult<()> {
        self.execute(&drop_table_statement(table)).await?;
        self.execute(&create_table_statement(table, schema, constraint))
            .await?;

        info!(%table, ?constraint, "replaced table");

        Ok(())
    }

    async fn replace_table_as(&mut self, table: &TableName, query: &str) -> LoadResult<()> {
        self.execute(&drop_table_statement(table)).await?;
        self.execute(&format!(
            "create table {} as {}",
            table.as_quoted_identifier(),
            query.trim().trim_end_matches(';')
        ))
        .await?;

        Ok(())
    }

    async fn create_table_like(&mut self, table: &TableName, template: &TableName) -> LoadResult<()> {
        self.execute(&format!(
            "create table if not exists {} (like {})",
            table.as_quoted_identifier(),
            template.as_quoted_identifier()
        ))
        .await?;

        Ok(())
    }

    async fn delete_rows(&mut self, table: &TableName) -> LoadResult<u64> {
        self.execute(&format!("delete from {}", table.as_quoted_identifier()))
            .await
    }

    async fn insert_row(
        &mut self,
        table: &TableName,
        schema: &TableSchema,
        row: &TableRow,
    ) -> LoadResult<()> {
        if row.values().len() != schema.columns.len() {
            bail!(
                ErrorKind::InvalidData,
                "Row arity does not match the table schema",
                format!(
                    "table {table} has {} columns, the row has {} values",
                    schema.columns.len(),
                    row.values().len()
                )
            );
        }

        let sql = insert_statement(table, schema);
        let query = row
            .values()
            .iter()
            .fold(sqlx::query(&sql), |query, cell| bind_cell(query, cell));

        match self.transaction.as_mut() {
            Some(transaction) => query.execute(&mut **transaction).await?,
            None => query.execute(&self.pool).await?,
        };

        Ok(())
    }

    async fn merge_rows(
        &mut self,
        source: &TableName,
        target: &TableName,
        schema: &TableSchema,
    ) -> LoadResult<u64> {
        let sql = merge_statement(source, target, schema)?;
        self.execute(&sql).await
    }

    async fn max_key_group(
        &mut self,
        table: &TableName,
        key_columns: &[String],
    ) -> LoadResult<Option<KeyGroup>> {
        let sql = max_key_group_query(table, key_columns)?;
        let Some(row) = self.fetch_optional(&sql).await? else {
            return Ok(None);
        };

        Ok(Some(KeyGroup {
            key: row.try_get("key")?,
            count: row.try_get("cnt")?,
        }))
    }

    async fn swap_tables(&mut self, target: &TableName, shadow: &TableName) -> LoadResult<()> {
        if self.transaction.is_none() {
            bail!(
                ErrorKind::InvalidState,
                "Tables can only be swapped inside a transaction"
            );
        }

        for statement in swap_statements(target, shadow) {
            self.execute(&statement).await?;
        }

        info!(%target, %shadow, "swapped tables");

        Ok(())
    }

    async fn count_rows(&mut self, table: &TableName) -> LoadResult<u64> {
        let sql = format!("select count(*) as cnt from {}", table.as_quoted_identifier());
        let row = self.fetch_optional(&sql).await?;
        let count: i64 = match row {
            Some(row) => row.try_get("cnt")?,
            None => 0,
        };

        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn fetch_rows(&mut self, table: &TableName, schema: &TableSchema) -> LoadResult<Vec<TableRow>> {
        let sql = select_statement(table, schema);
        let rows = self.fetch_all(&sql).await?;

        rows.iter().map(|row| decode_row(row, schema)).collect()
    }
}

fn drop_table_statement(table: &TableName) -> String {
    format!("drop table if exists {}", table.as_quoted_identifier())
}

fn create_table_statement(
    table: &TableName,
    schema: &TableSchema,
    constraint: KeyConstraint,
) -> String {
    let mut definitions: Vec<String> = schema
        .columns
        .iter()
        .map(|column| {
            let not_null = if column.nullable && !column.primary_key {
                ""
            } else {
                " not null"
            };
            format!("{} {}{not_null}", column.quoted_name(), column.typ.sql_type())
        })
        .collect();

    if constraint == KeyConstraint::Enforced && schema.has_key() {
        let keys = schema
            .key_columns()
            .map(|column| column.quoted_name())
            .collect::<Vec<_>>()
            .join(", ");
        definitions.push(format!("primary key ({keys})"));
    }

    format!(
        "create table {} ({})",
        table.as_quoted_identifier(),
        definitions.join(", ")
    )
}

/// Builds an insert with one placeholder per column, each cast to the column type so
/// untyped nulls and narrower numerics are coerced by the server.
fn insert_statement(table: &TableName, schema: &TableSchema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|column| column.quoted_name())
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = schema
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| format!("${}::{}", index + 1, column.typ.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "insert into {} ({columns}) values ({placeholders})",
        table.as_quoted_identifier()
    )
}

fn merge_statement(source: &TableName, target: &TableName, schema: &TableSchema) -> LoadResult<String> {
    if !schema.has_key() {
        bail!(
            ErrorKind::InvalidState,
            "Merge requires at least one key column",
            format!("no key columns declared for {target}")
        );
    }

    let on = schema
        .key_columns()
        .map(|column| {
            let name = column.quoted_name();
            format!("target.{name} = stage.{name}")
        })
        .collect::<Vec<_>>()
        .join(" and ");

    let assignments = schema
        .non_key_columns()
        .map(|column| {
            let name = column.quoted_name();
            format!("{name} = stage.{name}")
        })
        .collect::<Vec<_>>();
    let when_matched = if assignments.is_empty() {
        "when matched then do nothing".to_owned()
    } else {
        format!("when matched then update set {}", assignments.join(", "))
    };

    let columns = schema
        .columns
        .iter()
        .map(|column| column.quoted_name())
        .collect::<Vec<_>>();
    let values = columns
        .iter()
        .map(|name| format!("stage.{name}"))
        .collect::<Vec<_>>();

    Ok(format!(
        "merge into {} as target using {} as stage on {on} {when_matched} \
         when not matched then insert ({}) values ({})",
        target.as_quoted_identifier(),
        source.as_quoted_identifier(),
        columns.join(", "),
        values.join(", ")
    ))
}

fn max_key_group_query(table: &TableName, key_columns: &[String]) -> LoadResult<String> {
    if key_columns.is_empty() {
        bail!(
            ErrorKind::InvalidState,
            "Key uniqueness check requires at least one key column",
            format!("no key columns given for {table}")
        );
    }

    let keys = key_columns
        .iter()
        .map(|column| quote_identifier(column).into_owned())
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "select row({keys})::text as key, count(*) as cnt from {} group by {keys} order by cnt desc limit 1",
        table.as_quoted_identifier()
    ))
}

/// Renames `target` to a scratch name, `shadow` to `target` and the scratch table to
/// `shadow`. Run inside one transaction the three renames commit as one catalog change.
fn swap_statements(target: &TableName, shadow: &TableName) -> [String; 3] {
    let scratch = quote_identifier(&format!("{}{SWAP_SCRATCH_SUFFIX}", target.name)).into_owned();
    let scratch_table = TableName {
        database: target.database.clone(),
        schema: target.schema.clone(),
        name: format!("{}{SWAP_SCRATCH_SUFFIX}", target.name),
    };

    [
        format!("alter table {} rename to {scratch}", target.as_quoted_identifier()),
        format!(
            "alter table {} rename to {}",
            shadow.as_quoted_identifier(),
            target.quoted_name()
        ),
        format!(
            "alter table {} rename to {}",
            scratch_table.as_quoted_identifier(),
            shadow.quoted_name()
        ),
    ]
}

fn select_statement(table: &TableName, schema: &TableSchema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|column| column.quoted_name())
        .collect::<Vec<_>>()
        .join(", ");
    let order = if schema.has_key() {
        schema
            .key_columns()
            .map(|column| column.quoted_name())
            .collect::<Vec<_>>()
            .join(", ")
    } else {
        columns.clone()
    };

    format!(
        "select {columns} from {} order by {order}",
        table.as_quoted_identifier()
    )
}

fn bind_cell<'q>(
    query: Query<'q, Postgres, PgArguments>,
    cell: &Cell,
) -> Query<'q, Postgres, PgArguments> {
    match cell {
        // The placeholder cast gives the null its column type.
        Cell::Null => query.bind(None::<String>),
        Cell::Bool(value) => query.bind(*value),
        Cell::String(value) => query.bind(value.clone()),
        Cell::I64(value) => query.bind(*value),
        Cell::Numeric(value) => query.bind(value.clone()),
        Cell::Date(value) => query.bind(*value),
        Cell::Timestamp(value) => query.bind(*value),
    }
}

fn decode_row(row: &PgRow, schema: &TableSchema) -> LoadResult<TableRow> {
    let mut values = Vec::with_capacity(schema.columns.len());
    for (index, column) in schema.columns.iter().enumerate() {
        let cell: Cell = match column.typ {
            ColumnType::Text => row.try_get::<Option<String>, _>(index)?.into(),
            ColumnType::Numeric { .. } => row
                .try_get::<Option<bigdecimal::BigDecimal>, _>(index)?
                .into(),
            ColumnType::BigInt => row.try_get::<Option<i64>, _>(index)?.into(),
            ColumnType::Boolean => row
                .try_get::<Option<bool>, _>(index)?
                .map(Cell::Bool)
                .unwrap_or(Cell::Null),
            ColumnType::Date => row.try_get::<Option<chrono::NaiveDate>, _>(index)?.into(),
            ColumnType::Timestamp => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
                .map(Cell::Timestamp)
                .unwrap_or(Cell::Null),
        };
        values.push(cell);
    }

    Ok(TableRow::new(values))
}
