use std::time::Duration;

use config::shared::{DestinationConfig, ScheduleConfig, SyncerConfig, WatermarkStoreConfig};
use etl::pipeline::{RunReport, SyncContext, SyncPipeline, TableStatus};
use etl::source::Source;
use etl::source::postgres::PgSource;
use etl::transform::TransformRegistry;
use etl::warehouse::bigquery::BigQueryWarehouse;
use etl::warehouse::memory::MemoryWarehouse;
use etl::warehouse::{Warehouse, WarehouseLayout};
use etl::watermark::WatermarkStore;
use etl::watermark::memory::MemoryWatermarkStore;
use etl::watermark::postgres::PostgresWatermarkStore;
use secrecy::ExposeSecret;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::SyncerResult;
use crate::migrations::migrate_watermarks;

/// Storage Write API connections opened towards BigQuery.
const BIGQUERY_CONNECTION_POOL_SIZE: usize = 4;

/// Project and datasets used when syncing into memory.
const MEMORY_PROJECT_ID: &str = "memory";
const MEMORY_DATASET_ID: &str = "analytics";
const MEMORY_STAGING_DATASET_ID: &str = "staging_tables";

/// Builds the sync context described by `config` and runs it.
///
/// With `once` set, or without a schedule, a single run is performed and its failure is
/// returned. Otherwise runs repeat until Ctrl+C.
pub async fn start_syncer(config: SyncerConfig, once: bool) -> SyncerResult<()> {
    let source = PgSource::new(config.source.clone());

    match &config.destination {
        DestinationConfig::Memory => {
            let layout = WarehouseLayout {
                project_id: MEMORY_PROJECT_ID.to_string(),
                dataset_id: MEMORY_DATASET_ID.to_string(),
                staging_dataset_id: MEMORY_STAGING_DATASET_ID.to_string(),
            };
            warn!("syncing into the in-memory warehouse, loaded rows are not persisted");

            start_with_warehouse(config, once, source, MemoryWarehouse::new(), layout).await
        }
        DestinationConfig::BigQuery {
            project_id,
            dataset_id,
            staging_dataset_id,
            service_account_key,
        } => {
            let layout = WarehouseLayout {
                project_id: project_id.clone(),
                dataset_id: dataset_id.clone(),
                staging_dataset_id: staging_dataset_id.clone(),
            };
            let warehouse = BigQueryWarehouse::new_with_key(
                project_id.clone(),
                service_account_key.expose_secret(),
                BIGQUERY_CONNECTION_POOL_SIZE,
            )
            .await?;

            start_with_warehouse(config, once, source, warehouse, layout).await
        }
    }
}

async fn start_with_warehouse<S, W>(
    config: SyncerConfig,
    once: bool,
    source: S,
    warehouse: W,
    layout: WarehouseLayout,
) -> SyncerResult<()>
where
    S: Source + Send + Sync + 'static,
    W: Warehouse + Send + Sync + 'static,
{
    match config.watermark.store {
        WatermarkStoreConfig::Memory => {
            warn!("watermark kept in memory, a restart falls back to the default lookback");

            let context = SyncContext {
                source,
                warehouse,
                watermark_store: MemoryWatermarkStore::new(),
                layout,
            };
            run_pipeline(context, config, once).await
        }
        WatermarkStoreConfig::Postgres => {
            migrate_watermarks(&config.source).await?;

            let context = SyncContext {
                source,
                warehouse,
                watermark_store: PostgresWatermarkStore::new(&config.source),
                layout,
            };
            run_pipeline(context, config, once).await
        }
    }
}

async fn run_pipeline<S, W, M>(
    context: SyncContext<S, W, M>,
    config: SyncerConfig,
    once: bool,
) -> SyncerResult<()>
where
    S: Source + Send + Sync + 'static,
    W: Warehouse + Send + Sync + 'static,
    M: WatermarkStore + Send + Sync + 'static,
{
    let schedule = if once { None } else { config.schedule };
    let pipeline = SyncPipeline::new(
        context,
        config.pipeline,
        config.watermark,
        TransformRegistry::with_builtins(),
    )?;

    match schedule {
        None => run_once(&pipeline).await,
        Some(schedule) => run_scheduled(&pipeline, schedule).await,
    }
}

async fn run_once<S, W, M>(pipeline: &SyncPipeline<S, W, M>) -> SyncerResult<()>
where
    S: Source + Send + Sync + 'static,
    W: Warehouse + Send + Sync + 'static,
    M: WatermarkStore + Send + Sync + 'static,
{
    let report = pipeline.run().await?;
    log_report(&report);
    report.into_result()?;

    Ok(())
}

/// Repeats runs every `schedule.interval_secs`, one at a time, until Ctrl+C.
///
/// A failed run is logged and the next one still happens; it restarts from the last committed
/// watermark.
async fn run_scheduled<S, W, M>(
    pipeline: &SyncPipeline<S, W, M>,
    schedule: ScheduleConfig,
) -> SyncerResult<()>
where
    S: Source + Send + Sync + 'static,
    W: Warehouse + Send + Sync + 'static,
    M: WatermarkStore + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(Duration::from_secs(schedule.interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_secs = schedule.interval_secs, "starting scheduled sync runs");

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(err) = result {
                    error!("failed to listen for ctrl+c: {err}");
                }
                info!("ctrl+c received, stopping scheduled sync runs");
                return Ok(());
            }
            _ = interval.tick() => {
                if let Err(err) = run_once(pipeline).await {
                    error!("sync run failed: {err}");
                }
            }
        }
    }
}

fn log_report(report: &RunReport) {
    for table in &report.tables {
        match &table.status {
            TableStatus::Done(outcome) => info!(table = %table.table, %outcome, "table synced"),
            TableStatus::Failed { phase, error } => {
                warn!(table = %table.table, %phase, %error, "table failed")
            }
        }
    }

    match report.committed_watermark {
        Some(watermark) => info!(%watermark, "sync run completed, watermark advanced"),
        None => warn!(
            failed_tables = report.failed_tables().count(),
            watermark = %report.watermark,
            "sync run incomplete, watermark kept"
        ),
    }
}
