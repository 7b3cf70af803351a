use std::fmt;
use std::future::Future;

use tokio_postgres::types::Type;

use crate::error::EtlResult;
use crate::types::{ColumnSchema, TableBatch};

/// Name of the staging column ordering rows of the same key.
pub const SEQUENCE_COLUMN: &str = "_etl_sequence";

/// Fully qualified warehouse table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    /// Returns the backtick quoted `project.dataset.table` path.
    pub fn quoted(&self) -> String {
        format!(
            "`{}.{}.{}`",
            escape_identifier(&self.project_id),
            escape_identifier(&self.dataset_id),
            escape_identifier(&self.table_id)
        )
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Where destination and staging tables live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseLayout {
    pub project_id: String,
    pub dataset_id: String,
    pub staging_dataset_id: String,
}

impl WarehouseLayout {
    pub fn destination(&self, table: &str) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset_id, table)
    }

    pub fn staging(&self, table: &str) -> TableRef {
        TableRef::new(&self.project_id, &self.staging_dataset_id, table)
    }
}

/// Set-based upsert of a staging table into a destination table.
///
/// When a key occurs several times in staging, the row with the highest [`SEQUENCE_COLUMN`]
/// value wins. Matched rows get every non-key column of `columns` overwritten; other rows are
/// inserted with `columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeStatement {
    pub target: TableRef,
    pub staging: TableRef,
    pub primary_key: String,
    pub columns: Vec<String>,
}

impl MergeStatement {
    /// Non-key columns updated on a match.
    pub fn update_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|column| *column != self.primary_key)
    }

    pub fn to_sql(&self) -> String {
        let key = quote_identifier(&self.primary_key);

        let mut sql = format!(
            "merge {target} as target using (select * except ({sequence}) from {staging} where true \
             qualify row_number() over (partition by {key} order by {sequence} desc) = 1) as source \
             on target.{key} = source.{key}",
            target = self.target.quoted(),
            staging = self.staging.quoted(),
            sequence = quote_identifier(SEQUENCE_COLUMN),
        );

        let assignments = self
            .update_columns()
            .map(|column| {
                let column = quote_identifier(column);
                format!("target.{column} = source.{column}")
            })
            .collect::<Vec<_>>();
        if !assignments.is_empty() {
            sql.push_str(" when matched then update set ");
            sql.push_str(&assignments.join(", "));
        }

        let columns = self
            .columns
            .iter()
            .map(|column| quote_identifier(column))
            .collect::<Vec<_>>();
        let values = columns
            .iter()
            .map(|column| format!("source.{column}"))
            .collect::<Vec<_>>();
        sql.push_str(&format!(
            " when not matched then insert ({}) values ({})",
            columns.join(", "),
            values.join(", ")
        ));

        sql
    }
}

/// A statement run against the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarehouseStatement {
    Merge(MergeStatement),
    Truncate(TableRef),
    CreateTableIfMissing {
        table: TableRef,
        columns: Vec<ColumnSchema>,
    },
}

impl WarehouseStatement {
    /// Table the statement writes to.
    pub fn table(&self) -> &TableRef {
        match self {
            WarehouseStatement::Merge(merge) => &merge.target,
            WarehouseStatement::Truncate(table) => table,
            WarehouseStatement::CreateTableIfMissing { table, .. } => table,
        }
    }

    /// Renders the statement as BigQuery SQL.
    pub fn to_sql(&self) -> String {
        match self {
            WarehouseStatement::Merge(merge) => merge.to_sql(),
            WarehouseStatement::Truncate(table) => format!("truncate table {}", table.quoted()),
            WarehouseStatement::CreateTableIfMissing { table, columns } => {
                let columns = columns
                    .iter()
                    .map(|column| {
                        format!(
                            "{} {}",
                            quote_identifier(&column.name),
                            bigquery_column_type(&column.typ)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");

                format!("create table if not exists {} ({columns})", table.quoted())
            }
        }
    }
}

/// Analytical store receiving the merged rows.
///
/// Both operations complete before returning; a returned `Ok` means the rows or the statement
/// are durable in the warehouse.
pub trait Warehouse {
    /// Returns the name of the warehouse.
    fn name() -> &'static str;

    /// Appends `batch` to `table`. The table must exist and contain every batch column.
    fn load_rows(
        &self,
        table: &TableRef,
        batch: &TableBatch,
    ) -> impl Future<Output = EtlResult<()>> + Send;

    /// Runs `statement` to completion.
    fn run_statement(
        &self,
        statement: &WarehouseStatement,
    ) -> impl Future<Output = EtlResult<()>> + Send;
}

/// Escapes backticks and backslashes so the value can be wrapped in backticks.
fn escape_identifier(identifier: &str) -> String {
    let mut escaped = String::with_capacity(identifier.len());
    for ch in identifier.chars() {
        match ch {
            '`' => escaped.push_str("\\`"),
            '\\' => escaped.push_str("\\\\"),
            _ => escaped.push(ch),
        }
    }

    escaped
}

/// Wraps a column name in backticks.
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", escape_identifier(identifier))
}

/// Maps a Postgres type to the BigQuery column type it is loaded as.
///
/// Arrays reach the warehouse as JSON cells.
pub fn bigquery_column_type(typ: &Type) -> &'static str {
    match *typ {
        Type::BOOL => "bool",
        Type::CHAR | Type::BPCHAR | Type::VARCHAR | Type::NAME | Type::TEXT => "string",
        Type::INT2 | Type::INT4 | Type::INT8 => "int64",
        Type::FLOAT4 | Type::FLOAT8 => "float64",
        Type::NUMERIC => "bignumeric",
        Type::DATE => "date",
        Type::TIME => "time",
        Type::TIMESTAMP => "datetime",
        Type::TIMESTAMPTZ => "timestamp",
        Type::UUID => "string",
        Type::JSON | Type::JSONB => "json",
        Type::BYTEA => "bytes",
        Type::BOOL_ARRAY
        | Type::TEXT_ARRAY
        | Type::VARCHAR_ARRAY
        | Type::INT2_ARRAY
        | Type::INT4_ARRAY
        | Type::INT8_ARRAY
        | Type::FLOAT4_ARRAY
        | Type::FLOAT8_ARRAY
        | Type::UUID_ARRAY => "json",
        _ => "string",
    }
}
