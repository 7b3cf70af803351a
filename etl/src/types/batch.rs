use postgres::schema::ColumnSchema;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, TableRow};

static NULL_CELL: Cell = Cell::Null;

/// Rows extracted from one source table in one run.
pub type ChangeBatch = TableBatch;

/// Rows shaped to a destination table's column contract.
pub type LoadBatch = TableBatch;

/// An in-memory tabular batch: a column list plus rows aligned with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableBatch {
    columns: Vec<ColumnSchema>,
    rows: Vec<TableRow>,
}

impl TableBatch {
    /// Creates a batch, checking that every row has one value per column.
    pub fn new(columns: Vec<ColumnSchema>, rows: Vec<TableRow>) -> EtlResult<Self> {
        if let Some(row) = rows.iter().find(|row| row.values().len() != columns.len()) {
            bail!(
                ErrorKind::InvalidData,
                "Row width does not match the batch columns",
                format!(
                    "expected {} values, got {}",
                    columns.len(),
                    row.values().len()
                )
            );
        }

        Ok(Self { columns, rows })
    }

    /// Creates a batch without rows.
    pub fn empty(columns: Vec<ColumnSchema>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<ColumnSchema>, Vec<TableRow>) {
        (self.columns, self.rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Returns the position of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Like [`TableBatch::column_index`] but fails with [`ErrorKind::MissingColumn`].
    pub fn require_column(&self, name: &str) -> EtlResult<usize> {
        match self.column_index(name) {
            Some(index) => Ok(index),
            None => bail!(
                ErrorKind::MissingColumn,
                "Column missing from batch",
                format!(
                    "column `{name}` not found, available columns: {}",
                    self.column_names().collect::<Vec<_>>().join(", ")
                )
            ),
        }
    }

    /// Returns the values of the column at `index`, one per row.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Cell> {
        self.rows
            .iter()
            .map(move |row| row.get(index).unwrap_or(&NULL_CELL))
    }
}

#[cfg(test)]
mod tests {
    use tokio_postgres::types::Type;

    use super::*;

    fn columns() -> Vec<ColumnSchema> {
        vec![
            ColumnSchema::new("id", Type::INT8, false),
            ColumnSchema::new("name", Type::TEXT, true),
        ]
    }

    #[test]
    fn rejects_rows_of_wrong_width() {
        let rows = vec![TableRow::new(vec![Cell::I64(1)])];

        let err = TableBatch::new(columns(), rows).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn looks_up_columns_by_name() {
        let batch = TableBatch::new(
            columns(),
            vec![
                TableRow::new(vec![Cell::I64(1), "a".into()]),
                TableRow::new(vec![Cell::I64(2), Cell::Null]),
            ],
        )
        .unwrap();

        assert_eq!(batch.column_index("name"), Some(1));
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.column_values(0).cloned().collect::<Vec<_>>(),
            vec![Cell::I64(1), Cell::I64(2)]
        );
        assert_eq!(
            batch.require_column("email").unwrap_err().kind(),
            ErrorKind::MissingColumn
        );
    }
}
