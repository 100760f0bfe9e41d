use crate::bail;
use crate::error::{ErrorKind, LoadResult};
use crate::types::{TableRow, TableSchema};

/// Rows produced by one normalizer call, sharing one schema.
///
/// A batch is consumed once by a loader and never persisted. Every row is checked on
/// construction: its arity matches the schema, each cell fits its column type, and
/// non-nullable columns (including every key column) hold a value.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    schema: TableSchema,
    rows: Vec<TableRow>,
}

impl Batch {
    pub fn new(schema: TableSchema, rows: Vec<TableRow>) -> LoadResult<Self> {
        for (position, row) in rows.iter().enumerate() {
            if row.values().len() != schema.columns.len() {
                bail!(
                    ErrorKind::InvalidData,
                    "Row arity does not match the table schema",
                    format!(
                        "row {position} has {} values, the schema declares {} columns",
                        row.values().len(),
                        schema.columns.len()
                    )
                );
            }

            for (cell, column) in row.values().iter().zip(&schema.columns) {
                if cell.is_null() && (!column.nullable || column.primary_key) {
                    bail!(
                        ErrorKind::InvalidData,
                        "Non-nullable column holds a null value",
                        format!("row {position}, column `{}`", column.name)
                    );
                }

                if !cell.fits(&column.typ) {
                    bail!(
                        ErrorKind::InvalidData,
                        "Cell does not fit its column type",
                        format!(
                            "row {position}, column `{}` of type {} holds {cell:?}",
                            column.name,
                            column.typ.sql_type()
                        )
                    );
                }
            }
        }

        Ok(Self { schema, rows })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_parts(self) -> (TableSchema, Vec<TableRow>) {
        (self.schema, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Cell, ColumnSchema, ColumnType};

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnSchema::key("id", ColumnType::Text),
            ColumnSchema::value("amount", ColumnType::BigInt),
        ])
    }

    #[test]
    fn accepts_well_formed_rows() {
        let rows = vec![
            TableRow::new(vec![Cell::from("K1"), Cell::I64(5)]),
            TableRow::new(vec![Cell::from("K2"), Cell::Null]),
        ];

        let batch = Batch::new(schema(), rows).unwrap();

        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }

    #[test]
    fn rejects_wrong_arity() {
        let rows = vec![TableRow::new(vec![Cell::from("K1")])];

        let err = Batch::new(schema(), rows).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_null_key() {
        let rows = vec![TableRow::new(vec![Cell::Null, Cell::I64(1)])];

        let err = Batch::new(schema(), rows).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert_eq!(err.detail(), Some("row 0, column `id`"));
    }

    #[test]
    fn rejects_mistyped_cell() {
        let rows = vec![TableRow::new(vec![Cell::from("K1"), Cell::from("five")])];

        let err = Batch::new(schema(), rows).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
