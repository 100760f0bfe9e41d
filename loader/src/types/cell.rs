use std::cmp::Ordering;
use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};

use crate::types::ColumnType;

/// A single typed value of a [`crate::types::TableRow`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cell {
    Null,
    Bool(bool),
    String(String),
    I64(i64),
    Numeric(BigDecimal),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Returns `true` when the cell can be stored in a column of type `typ`.
    ///
    /// [`Cell::Null`] fits every type; nullability is checked separately.
    pub fn fits(&self, typ: &ColumnType) -> bool {
        matches!(
            (self, typ),
            (Cell::Null, _)
                | (Cell::Bool(_), ColumnType::Boolean)
                | (Cell::String(_), ColumnType::Text)
                | (Cell::I64(_), ColumnType::BigInt)
                | (Cell::Numeric(_), ColumnType::Numeric { .. })
                | (Cell::I64(_), ColumnType::Numeric { .. })
                | (Cell::Date(_), ColumnType::Date)
                | (Cell::Timestamp(_), ColumnType::Timestamp)
        )
    }

    /// Renders `cells` the way Postgres renders `row(..)::text`, e.g. `(AAPL,2024-01-02)`.
    pub fn row_literal<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> String {
        let fields = cells
            .into_iter()
            .map(Cell::row_field)
            .collect::<Vec<_>>()
            .join(",");

        format!("({fields})")
    }

    fn row_field(&self) -> String {
        let text = match self {
            Cell::Null => return String::new(),
            Cell::Bool(value) => return if *value { "t" } else { "f" }.to_owned(),
            other => other.to_string(),
        };

        let needs_quotes = text.is_empty()
            || text
                .chars()
                .any(|c| matches!(c, '(' | ')' | ',' | '"' | '\\') || c.is_whitespace());
        if !needs_quotes {
            return text;
        }

        let mut quoted = String::with_capacity(text.len() + 2);
        quoted.push('"');
        for c in text.chars() {
            if c == '"' || c == '\\' {
                quoted.push(c);
            }
            quoted.push(c);
        }
        quoted.push('"');
        quoted
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Bool(_) => 1,
            Cell::String(_) => 2,
            Cell::I64(_) => 3,
            Cell::Numeric(_) => 4,
            Cell::Date(_) => 5,
            Cell::Timestamp(_) => 6,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "null"),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::String(value) => write!(f, "{value}"),
            Cell::I64(value) => write!(f, "{value}"),
            Cell::Numeric(value) => write!(f, "{value}"),
            Cell::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Cell::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders cells of the same variant by value, and mixed variants by a fixed variant rank.
impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::String(a), Cell::String(b)) => a.cmp(b),
            (Cell::I64(a), Cell::I64(b)) => a.cmp(b),
            (Cell::Numeric(a), Cell::Numeric(b)) => a.cmp(b),
            (Cell::Date(a), Cell::Date(b)) => a.cmp(b),
            (Cell::Timestamp(a), Cell::Timestamp(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::String(value.to_owned())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::String(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::I64(value)
    }
}

impl From<BigDecimal> for Cell {
    fn from(value: BigDecimal) -> Self {
        Cell::Numeric(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}
