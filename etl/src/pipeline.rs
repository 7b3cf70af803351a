//! Orchestration of one sync run across every configured table.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use config::shared::{PipelineConfig, TableConfig, WatermarkConfig};
use futures::future::join_all;
use tokio::sync::{Semaphore, watch};
use tracing::{Instrument, error, info, info_span, warn};

#[cfg(feature = "failpoints")]
use crate::failpoints::{WATERMARK_BEFORE_COMMIT, etl_fail_point};

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::extract::Extractor;
use crate::load::MergeLoader;
use crate::retry::RetryPolicy;
use crate::source::Source;
use crate::transform::{TransformInputs, TransformRegistry, run_transform};
use crate::types::TableName;
use crate::warehouse::{Warehouse, WarehouseLayout};
use crate::watermark::{WatermarkStore, format_watermark, parse_watermark};

/// Collaborators of a sync run, passed explicitly to the pipeline.
#[derive(Debug)]
pub struct SyncContext<S, W, M> {
    pub source: S,
    pub warehouse: W,
    pub watermark_store: M,
    pub layout: WarehouseLayout,
}

/// Step a table pipeline is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePhase {
    Idle,
    Extracting,
    Transforming,
    Loading,
}

impl fmt::Display for TablePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            TablePhase::Idle => "idle",
            TablePhase::Extracting => "extracting",
            TablePhase::Transforming => "transforming",
            TablePhase::Loading => "loading",
        };
        f.write_str(phase)
    }
}

/// What a successful table pipeline did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    /// No input had changed rows, nothing was loaded.
    NoChanges,
    /// `rows` rows were staged and merged into the destination.
    Merged { rows: usize },
}

impl fmt::Display for TableOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableOutcome::NoChanges => f.write_str("no changes"),
            TableOutcome::Merged { rows } => write!(f, "{rows} rows merged"),
        }
    }
}

/// Terminal state of a table pipeline.
#[derive(Debug, Clone)]
pub enum TableStatus {
    Done(TableOutcome),
    Failed { phase: TablePhase, error: EtlError },
}

#[derive(Debug, Clone)]
pub struct TableReport {
    pub table: String,
    pub status: TableStatus,
}

impl TableReport {
    pub fn is_done(&self) -> bool {
        matches!(self.status, TableStatus::Done(_))
    }

    pub fn error(&self) -> Option<&EtlError> {
        match &self.status {
            TableStatus::Failed { error, .. } => Some(error),
            TableStatus::Done(_) => None,
        }
    }
}

/// Result of a sync run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Instant the run started at, the next watermark on success.
    pub started_at: DateTime<Utc>,
    /// Watermark the changes were extracted from.
    pub watermark: DateTime<Utc>,
    /// One report per configured table, in configuration order.
    pub tables: Vec<TableReport>,
    /// Watermark stored by this run, `None` when at least one table failed.
    pub committed_watermark: Option<DateTime<Utc>>,
}

impl RunReport {
    /// Returns `true` when every table is done and the watermark was advanced.
    pub fn is_completed(&self) -> bool {
        self.committed_watermark.is_some()
    }

    pub fn failed_tables(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|report| !report.is_done())
    }

    /// Converts a failed run into an error aggregating every table failure.
    pub fn into_result(self) -> EtlResult<RunReport> {
        let errors: Vec<EtlError> = self.failed_tables().filter_map(|t| t.error().cloned()).collect();
        if errors.is_empty() {
            return Ok(self);
        }

        Err(errors.into())
    }
}

/// Sync pipeline running extraction, transformation and load for every configured table.
#[derive(Debug)]
pub struct SyncPipeline<S, W, M> {
    context: Arc<SyncContext<S, W, M>>,
    config: Arc<PipelineConfig>,
    watermark_config: WatermarkConfig,
    registry: Arc<TransformRegistry>,
}

impl<S, W, M> SyncPipeline<S, W, M>
where
    S: Source + Send + Sync + 'static,
    W: Warehouse + Send + Sync + 'static,
    M: WatermarkStore + Send + Sync + 'static,
{
    /// Creates a pipeline, failing on an invalid configuration or when a configured table has no
    /// registered transform.
    pub fn new(
        context: SyncContext<S, W, M>,
        config: PipelineConfig,
        watermark_config: WatermarkConfig,
        registry: TransformRegistry,
    ) -> EtlResult<Self> {
        config.validate().map_err(|err| {
            etl_error!(
                ErrorKind::ConfigError,
                "Invalid pipeline configuration",
                source: err
            )
        })?;
        watermark_config.validate().map_err(|err| {
            etl_error!(
                ErrorKind::ConfigError,
                "Invalid watermark configuration",
                source: err
            )
        })?;
        registry.validate(&config.tables)?;

        Ok(Self {
            context: Arc::new(context),
            config: Arc::new(config),
            watermark_config,
            registry: Arc::new(registry),
        })
    }

    pub fn context(&self) -> &SyncContext<S, W, M> {
        &self.context
    }

    /// Runs every table once and advances the watermark when all of them are done.
    ///
    /// Table failures are reported in the returned [`RunReport`]. Errors are returned only when
    /// the watermark cannot be read or written.
    pub async fn run(&self) -> EtlResult<RunReport> {
        let started_at = Utc::now();
        let watermark = self.read_watermark(started_at).await?;

        info!(
            %watermark,
            tables = self.config.tables.len(),
            "starting sync run"
        );

        let semaphore = Arc::new(Semaphore::new(usize::from(self.config.max_concurrent_tables)));
        let mut phases = Vec::with_capacity(self.config.tables.len());
        let mut handles = Vec::with_capacity(self.config.tables.len());

        for table in self.config.tables.iter().cloned() {
            let (phase_tx, phase_rx) = watch::channel(TablePhase::Idle);
            phases.push(phase_rx);

            let semaphore = semaphore.clone();
            let context = self.context.clone();
            let config = self.config.clone();
            let registry = self.registry.clone();
            let span = info_span!("table_sync", table = %table.name);

            handles.push(tokio::spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|err| {
                        etl_error!(
                            ErrorKind::InvalidState,
                            "Table concurrency limiter was closed",
                            source: err
                        )
                    })?;

                    sync_table(&context, &config, &registry, &table, watermark, &phase_tx).await
                }
                .instrument(span),
            ));
        }

        // Join barrier: the watermark is only touched once every table reached a terminal state.
        let results = join_all(handles).await;

        let mut tables = Vec::with_capacity(results.len());
        for ((table, result), phase_rx) in self.config.tables.iter().zip(results).zip(phases) {
            let phase = *phase_rx.borrow();
            let status = match result {
                Ok(Ok(outcome)) => TableStatus::Done(outcome),
                Ok(Err(error)) => TableStatus::Failed { phase, error },
                Err(join_error) => TableStatus::Failed {
                    phase,
                    error: etl_error!(
                        ErrorKind::TableSyncPanic,
                        "Table sync task panicked",
                        format!("table {}", table.name),
                        source: join_error
                    ),
                },
            };

            if let TableStatus::Failed { phase, error } = &status {
                error!(table = %table.name, %phase, %error, "table sync failed");
            }

            tables.push(TableReport {
                table: table.name.clone(),
                status,
            });
        }

        let mut report = RunReport {
            started_at,
            watermark,
            tables,
            committed_watermark: None,
        };

        let failed = report.failed_tables().count();
        if failed > 0 {
            warn!(failed, "sync run finished with failed tables, watermark not advanced");
            return Ok(report);
        }

        self.commit_watermark(started_at).await?;
        report.committed_watermark = Some(started_at);

        info!(watermark = %started_at, "sync run completed");

        Ok(report)
    }

    /// Returns the stored watermark, or `started_at` minus the default lookback.
    async fn read_watermark(&self, started_at: DateTime<Utc>) -> EtlResult<DateTime<Utc>> {
        let name = &self.watermark_config.name;
        let stored = self.context.watermark_store.get(name).await.map_err(|err| {
            etl_error!(
                ErrorKind::WatermarkStoreError,
                "Failed to read the watermark",
                format!("watermark `{name}`"),
                source: err
            )
        })?;

        match stored {
            Some(value) => parse_watermark(&value),
            None => {
                let lookback =
                    ChronoDuration::days(i64::from(self.watermark_config.default_lookback_days));
                info!(
                    name = %name,
                    lookback_days = self.watermark_config.default_lookback_days,
                    "no stored watermark, using the default lookback"
                );
                started_at.checked_sub_signed(lookback).ok_or_else(|| {
                    etl_error!(
                        ErrorKind::ConfigError,
                        "Default lookback is out of range",
                        format!(
                            "{} days before {started_at}",
                            self.watermark_config.default_lookback_days
                        )
                    )
                })
            }
        }
    }

    async fn commit_watermark(&self, watermark: DateTime<Utc>) -> EtlResult<()> {
        let name = &self.watermark_config.name;
        let value = format_watermark(watermark);

        let result = async {
            #[cfg(feature = "failpoints")]
            etl_fail_point(WATERMARK_BEFORE_COMMIT)?;

            self.context.watermark_store.set(name, &value).await
        }
        .await;

        result.map_err(|err| {
            etl_error!(
                ErrorKind::WatermarkCommitFailed,
                "Failed to commit the watermark",
                format!("watermark `{name}` = {value}"),
                source: err
            )
        })
    }
}

async fn sync_table<S, W, M>(
    context: &SyncContext<S, W, M>,
    config: &PipelineConfig,
    registry: &TransformRegistry,
    table: &TableConfig,
    watermark: DateTime<Utc>,
    phase: &watch::Sender<TablePhase>,
) -> EtlResult<TableOutcome>
where
    S: Source,
    W: Warehouse,
{
    let Some(transform) = registry.get(&table.name) else {
        return Err(etl_error!(
            ErrorKind::MissingTransform,
            "No transform registered for table",
            format!("table `{}`", table.name)
        ));
    };

    phase.send_replace(TablePhase::Extracting);
    let extractor = Extractor::new(
        &context.source,
        RetryPolicy::from(config.extract_retry),
        config.max_extracted_rows,
    );

    let mut inputs = TransformInputs::new();
    for input in transform.inputs() {
        let source_table = TableName::new(&table.schema, input);
        let batch = extractor
            .extract(&source_table, table.track_deletes, watermark)
            .await?;

        if batch.is_empty() {
            info!(input = %source_table, "no changes in input, skipping transform and load");
            return Ok(TableOutcome::NoChanges);
        }

        inputs.insert(input.clone(), batch);
    }

    phase.send_replace(TablePhase::Transforming);
    let batch = run_transform(&table.name, transform.as_ref(), &inputs)?;
    if batch.is_empty() {
        info!("transform produced no rows, skipping load");
        return Ok(TableOutcome::NoChanges);
    }

    phase.send_replace(TablePhase::Loading);
    let loader = MergeLoader::new(
        &context.warehouse,
        &context.layout,
        RetryPolicy::from(config.load_retry),
    );
    let rows = loader.load(&table.name, &table.primary_key, &batch).await?;

    Ok(TableOutcome::Merged { rows })
}
