use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::error::{ErrorKind, EtlResult};
use crate::extract::query::{ChangeFilter, ChangeQuery};
use crate::source::base::Source;
use crate::types::{Cell, ChangeBatch, ColumnSchema, TableBatch, TableName, TableRow};
use crate::{bail, etl_error};

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    remaining: u32,
    kind: ErrorKind,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableName, TableBatch>,
    failures: HashMap<TableName, InjectedFailure>,
    fetches: HashMap<TableName, u32>,
}

/// In-memory source for tests and local runs.
///
/// Change queries are evaluated against the stored batches: a row matches when any filter
/// column holds an instant at or after the watermark, and the query limit is honored. Failures
/// can be injected per table to exercise retries.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `batch` as the full content of `table`, replacing any previous content.
    pub async fn insert_table(&self, table: TableName, batch: TableBatch) {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(table, batch);
    }

    /// Appends rows to an existing table.
    pub async fn append_rows(&self, table: &TableName, rows: Vec<TableRow>) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;

        let Some(batch) = inner.tables.remove(table) else {
            bail!(
                ErrorKind::SourceSchemaError,
                "Table not found in the source catalog",
                format!("table {table} does not exist")
            );
        };

        let (columns, mut existing) = batch.into_parts();
        existing.extend(rows);
        let batch = TableBatch::new(columns, existing)?;
        inner.tables.insert(table.clone(), batch);

        Ok(())
    }

    /// Makes the next `times` change queries on `table` fail with an error of `kind`.
    pub async fn fail_next_fetches(&self, table: TableName, times: u32, kind: ErrorKind) {
        let mut inner = self.inner.lock().await;
        inner.failures.insert(
            table,
            InjectedFailure {
                remaining: times,
                kind,
            },
        );
    }

    /// Returns how many change queries were run against `table`, failed ones included.
    pub async fn fetch_count(&self, table: &TableName) -> u32 {
        let inner = self.inner.lock().await;
        inner.fetches.get(table).copied().unwrap_or(0)
    }
}

impl Source for MemorySource {
    fn name() -> &'static str {
        "memory"
    }

    async fn table_columns(&self, table: &TableName) -> EtlResult<Vec<ColumnSchema>> {
        let inner = self.inner.lock().await;

        match inner.tables.get(table) {
            Some(batch) => Ok(batch.columns().to_vec()),
            None => Err(etl_error!(
                ErrorKind::SourceSchemaError,
                "Table not found in the source catalog",
                format!("table {table} does not exist")
            )),
        }
    }

    async fn fetch_changes(&self, query: &ChangeQuery) -> EtlResult<ChangeBatch> {
        let mut inner = self.inner.lock().await;
        let table = query.table();

        *inner.fetches.entry(table.clone()).or_default() += 1;

        if let Some(failure) = inner.failures.get_mut(table)
            && failure.remaining > 0
        {
            failure.remaining -= 1;
            bail!(
                failure.kind,
                "Injected source failure",
                format!("change query on {table} failed")
            );
        }

        let Some(batch) = inner.tables.get(table) else {
            bail!(
                ErrorKind::SourceSchemaError,
                "Table not found in the source catalog",
                format!("table {table} does not exist")
            );
        };

        let mut indices = Vec::with_capacity(query.columns().len());
        for column in query.columns() {
            indices.push(batch.require_column(&column.name)?);
        }

        let filter_indices = match query.filter() {
            ChangeFilter::Since { columns, .. } => columns
                .iter()
                .map(|column| batch.require_column(column.column_name()))
                .collect::<EtlResult<Vec<_>>>()?,
            ChangeFilter::All => Vec::new(),
        };

        let mut rows = Vec::new();
        for row in batch.rows() {
            if let Some(watermark) = query.watermark() {
                let changed = filter_indices.iter().any(|&index| {
                    row.get(index)
                        .and_then(|cell| cell.as_utc_instant())
                        .is_some_and(|instant| instant >= watermark)
                });
                if !changed {
                    continue;
                }
            }

            if let Some(limit) = query.limit()
                && rows.len() as u64 >= limit
            {
                break;
            }

            let values = indices
                .iter()
                .map(|&index| row.get(index).cloned().unwrap_or(Cell::Null))
                .collect::<Vec<_>>();
            rows.push(TableRow::new(values));
        }

        info!(%table, rows = rows.len(), "fetched changed rows");

        TableBatch::new(query.columns().to_vec(), rows)
    }
}
