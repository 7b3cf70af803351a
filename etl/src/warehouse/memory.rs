use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, ColumnSchema, TableBatch, TableRow};
use crate::warehouse::base::{
    MergeStatement, SEQUENCE_COLUMN, TableRef, Warehouse, WarehouseStatement,
};
use crate::{bail, etl_error};

/// Operation of [`MemoryWarehouse`] that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarehouseOperation {
    LoadRows,
    Merge,
    Truncate,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<ColumnSchema>,
    rows: Vec<TableRow>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableRef, MemoryTable>,
    failures: HashMap<(String, WarehouseOperation), (u32, ErrorKind)>,
    statements: Vec<String>,
}

/// In-memory warehouse interpreting [`WarehouseStatement`]s, for tests and local runs.
///
/// Tables must be created before rows are appended, like with the Storage Write API.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the rows of `table` as batch, or `None` when the table does not exist.
    pub async fn table(&self, table: &TableRef) -> Option<TableBatch> {
        let inner = self.inner.lock().await;
        let table = inner.tables.get(table)?;

        Some(
            TableBatch::new(table.columns.clone(), table.rows.clone())
                .unwrap_or_else(|_| TableBatch::empty(table.columns.clone())),
        )
    }

    /// Returns the number of rows in `table`, zero when it does not exist.
    pub async fn row_count(&self, table: &TableRef) -> usize {
        let inner = self.inner.lock().await;
        inner.tables.get(table).map_or(0, |table| table.rows.len())
    }

    /// SQL of every statement run so far, in order.
    pub async fn statements(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.statements.clone()
    }

    /// Makes the next `times` `operation`s on tables called `table_id` fail with `kind`.
    pub async fn fail_next(
        &self,
        table_id: impl Into<String>,
        operation: WarehouseOperation,
        times: u32,
        kind: ErrorKind,
    ) {
        let mut inner = self.inner.lock().await;
        inner
            .failures
            .insert((table_id.into(), operation), (times, kind));
    }
}

impl Inner {
    fn injected_failure(&mut self, table: &TableRef, operation: WarehouseOperation) -> EtlResult<()> {
        let key = (table.table_id.clone(), operation);
        if let Some((remaining, kind)) = self.failures.get_mut(&key)
            && *remaining > 0
        {
            *remaining -= 1;
            bail!(
                *kind,
                "Injected warehouse failure",
                format!("{operation:?} on {table} failed")
            );
        }

        Ok(())
    }

    fn table_mut(&mut self, table: &TableRef) -> EtlResult<&mut MemoryTable> {
        self.tables.get_mut(table).ok_or_else(|| {
            etl_error!(
                ErrorKind::DestinationSchemaError,
                "Warehouse table does not exist",
                format!("table {table} not found")
            )
        })
    }

    fn merge(&mut self, merge: &MergeStatement) -> EtlResult<()> {
        let staging = self
            .tables
            .get(&merge.staging)
            .cloned()
            .ok_or_else(|| {
                etl_error!(
                    ErrorKind::DestinationSchemaError,
                    "Warehouse table does not exist",
                    format!("table {} not found", merge.staging)
                )
            })?;
        let staging = TableBatch::new(staging.columns, staging.rows)?;

        let key_index = staging.require_column(&merge.primary_key)?;
        let sequence_index = staging.require_column(SEQUENCE_COLUMN)?;
        let mut source_indices = Vec::with_capacity(merge.columns.len());
        for column in &merge.columns {
            source_indices.push(staging.require_column(column)?);
        }

        // Last staged occurrence of each key, in first-seen key order.
        let mut latest: Vec<&TableRow> = Vec::new();
        for row in staging.rows() {
            let key = &row.values()[key_index];
            if key.is_null() {
                bail!(
                    ErrorKind::InvalidData,
                    "Staged row has a null primary key",
                    format!("table {}", merge.staging)
                );
            }

            match latest
                .iter_mut()
                .find(|existing| same_key(&existing.values()[key_index], key))
            {
                Some(existing) => {
                    if row.values()[sequence_index].as_str() > existing.values()[sequence_index].as_str() {
                        *existing = row;
                    }
                }
                None => latest.push(row),
            }
        }

        let target = self.table_mut(&merge.target)?;
        let target_key = column_position(target, &merge.primary_key)?;
        let mut target_indices = Vec::with_capacity(merge.columns.len());
        for column in &merge.columns {
            target_indices.push(column_position(target, column)?);
        }

        for source_row in latest {
            let key = &source_row.values()[key_index];
            let matched = target
                .rows
                .iter()
                .position(|row| same_key(&row.values()[target_key], key));

            match matched {
                Some(position) => {
                    let mut values = target.rows[position].clone().into_values();
                    for (source, destination) in source_indices.iter().zip(&target_indices) {
                        if *destination != target_key {
                            values[*destination] = source_row.values()[*source].clone();
                        }
                    }
                    target.rows[position] = TableRow::new(values);
                }
                None => {
                    let mut values = vec![Cell::Null; target.columns.len()];
                    for (source, destination) in source_indices.iter().zip(&target_indices) {
                        values[*destination] = source_row.values()[*source].clone();
                    }
                    target.rows.push(TableRow::new(values));
                }
            }
        }

        Ok(())
    }
}

fn column_position(table: &MemoryTable, name: &str) -> EtlResult<usize> {
    table
        .columns
        .iter()
        .position(|column| column.name == name)
        .ok_or_else(|| {
            etl_error!(
                ErrorKind::DestinationSchemaError,
                "Warehouse column does not exist",
                format!("column `{name}` not found")
            )
        })
}

/// Key equality across integer widths.
fn same_key(a: &Cell, b: &Cell) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

impl Warehouse for MemoryWarehouse {
    fn name() -> &'static str {
        "memory"
    }

    async fn load_rows(&self, table: &TableRef, batch: &TableBatch) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        inner.injected_failure(table, WarehouseOperation::LoadRows)?;

        let target = inner.table_mut(table)?;
        let mut positions = Vec::with_capacity(batch.columns().len());
        for column in batch.columns() {
            positions.push(column_position(target, &column.name)?);
        }

        for row in batch.rows() {
            let mut values = vec![Cell::Null; target.columns.len()];
            for (value, position) in row.values().iter().zip(&positions) {
                values[*position] = value.clone();
            }
            target.rows.push(TableRow::new(values));
        }

        info!(%table, rows = batch.len(), "appended rows to memory warehouse");

        Ok(())
    }

    async fn run_statement(&self, statement: &WarehouseStatement) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        let sql = statement.to_sql();
        debug!(%sql, "running warehouse statement");
        inner.statements.push(sql);

        match statement {
            WarehouseStatement::Merge(merge) => {
                inner.injected_failure(&merge.target, WarehouseOperation::Merge)?;
                inner.merge(merge)
            }
            WarehouseStatement::Truncate(table) => {
                inner.injected_failure(table, WarehouseOperation::Truncate)?;
                inner.table_mut(table)?.rows.clear();
                Ok(())
            }
            WarehouseStatement::CreateTableIfMissing { table, columns } => {
                inner
                    .tables
                    .entry(table.clone())
                    .or_insert_with(|| MemoryTable {
                        columns: columns.clone(),
                        rows: Vec::new(),
                    });
                Ok(())
            }
        }
    }
}
