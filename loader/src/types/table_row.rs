use crate::types::Cell;

/// A complete row of a loaded table.
///
/// Values are ordered to match the columns of the [`crate::types::TableSchema`] the row
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRow {
    values: Vec<Cell>,
}

impl TableRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    /// Returns the row values in table column order.
    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    /// Returns mutable access to row values in table column order.
    pub fn values_mut(&mut self) -> &mut Vec<Cell> {
        &mut self.values
    }

    /// Consumes the row and returns its values in table column order.
    pub fn into_values(self) -> Vec<Cell> {
        self.values
    }

    /// Returns the cells at `indexes`, in that order.
    pub fn project(&self, indexes: &[usize]) -> Vec<Cell> {
        indexes
            .iter()
            .filter_map(|index| self.values.get(*index).cloned())
            .collect()
    }
}

impl From<Vec<Cell>> for TableRow {
    fn from(values: Vec<Cell>) -> Self {
        TableRow::new(values)
    }
}
