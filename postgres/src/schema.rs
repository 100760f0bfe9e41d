use pg_escape::quote_identifier;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing a [`TableName`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableNameError {
    #[error("table name `{0}` must be `database.schema.table` or `schema.table`")]
    InvalidFormat(String),
    #[error("table name `{0}` contains an empty part")]
    EmptyPart(String),
}

/// A fully qualified table name.
///
/// The optional database part is kept so configured names round-trip, and it is
/// included when quoting: Postgres accepts a catalog qualifier that matches the
/// current database and rejects any other, which surfaces a misconfigured target
/// instead of silently writing elsewhere.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TableName {
    pub database: Option<String>,
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            database: None,
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the table name as a properly quoted Postgres identifier.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        match &self.database {
            Some(database) => {
                let quoted_database = quote_identifier(database);
                format!("{quoted_database}.{quoted_schema}.{quoted_name}")
            }
            None => format!("{quoted_schema}.{quoted_name}"),
        }
    }

    /// Returns only the quoted relation name, as required by `alter table .. rename to`.
    pub fn quoted_name(&self) -> String {
        quote_identifier(&self.name).into_owned()
    }

    /// Returns a sibling table in the same database and schema whose name is
    /// `prefix` followed by this table's name.
    pub fn with_prefix(&self, prefix: &str) -> TableName {
        TableName {
            database: self.database.clone(),
            schema: self.schema.clone(),
            name: format!("{prefix}{}", self.name),
        }
    }
}

impl FromStr for TableName {
    type Err = TableNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.iter().any(|part| part.trim().is_empty()) {
            return Err(TableNameError::EmptyPart(s.to_owned()));
        }

        match parts.as_slice() {
            [schema, name] => Ok(TableName::new(schema.trim(), name.trim())),
            [database, schema, name] => Ok(TableName {
                database: Some(database.trim().to_owned()),
                schema: schema.trim().to_owned(),
                name: name.trim().to_owned(),
            }),
            _ => Err(TableNameError::InvalidFormat(s.to_owned())),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(database) = &self.database {
            write!(f, "{database}.")?;
        }
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column types a load can declare.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ColumnType {
    Text,
    Numeric { precision: u16, scale: u16 },
    BigInt,
    Boolean,
    Date,
    Timestamp,
}

impl ColumnType {
    /// Returns the Postgres type name, including modifiers.
    pub fn sql_type(&self) -> String {
        match self {
            ColumnType::Text => "text".to_owned(),
            ColumnType::Numeric { precision, scale } => format!("numeric({precision}, {scale})"),
            ColumnType::BigInt => "bigint".to_owned(),
            ColumnType::Boolean => "boolean".to_owned(),
            ColumnType::Date => "date".to_owned(),
            ColumnType::Timestamp => "timestamp".to_owned(),
        }
    }
}

/// One column of a [`TableSchema`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub typ: ColumnType,
    pub nullable: bool,
    /// Whether the column is part of the table's logical key.
    pub primary_key: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, typ: ColumnType, nullable: bool, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            typ,
            nullable,
            primary_key,
        }
    }

    /// Creates a non-nullable key column.
    pub fn key(name: impl Into<String>, typ: ColumnType) -> Self {
        Self::new(name, typ, false, true)
    }

    /// Creates a nullable non-key column.
    pub fn value(name: impl Into<String>, typ: ColumnType) -> Self {
        Self::new(name, typ, true, false)
    }

    pub fn quoted_name(&self) -> String {
        quote_identifier(&self.name).into_owned()
    }
}

/// Ordered column definitions of a loaded table.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TableSchema {
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnSchema>) -> Self {
        Self { columns }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Returns the logical key columns in declaration order.
    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|column| column.primary_key)
    }

    pub fn non_key_columns(&self) -> impl Iterator<Item = &ColumnSchema> {
        self.columns.iter().filter(|column| !column.primary_key)
    }

    /// Returns the positions of the key columns within a row.
    pub fn key_indexes(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.primary_key)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn has_key(&self) -> bool {
        self.columns.iter().any(|column| column.primary_key)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }
}
