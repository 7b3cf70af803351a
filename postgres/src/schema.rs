use pg_escape::quote_identifier;
use std::fmt;
use tokio_postgres::types::Type;

/// Schema used when a table is referenced without one.
pub const DEFAULT_SCHEMA: &str = "public";

/// A fully qualified Postgres table name consisting of a schema and table name.
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct TableName {
    /// The schema name containing the table
    pub schema: String,
    /// The name of the table within the schema
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Creates a table name in the [`DEFAULT_SCHEMA`].
    pub fn public(name: impl Into<String>) -> TableName {
        Self::new(DEFAULT_SCHEMA, name)
    }

    /// Returns the table name as a properly quoted Postgres identifier.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        format!("{quoted_schema}.{quoted_name}")
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{0}.{1}", self.schema, self.name))
    }
}

/// Represents the schema of a single column in a Postgres table or in a batch derived from it.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ColumnSchema {
    /// The name of the column.
    pub name: String,
    /// The Postgres data type of the column.
    pub typ: Type,
    /// Whether the column can contain NULL values.
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, typ: Type, nullable: bool) -> ColumnSchema {
        Self {
            name: name.into(),
            typ,
            nullable,
        }
    }

    /// Returns a copy of this column under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> ColumnSchema {
        Self {
            name: name.into(),
            typ: self.typ.clone(),
            nullable: self.nullable,
        }
    }
}
