use config::shared::{PipelineConfig, RetryConfig, TableConfig, WatermarkConfig};

use crate::error::EtlResult;
use crate::pipeline::{SyncContext, SyncPipeline};
use crate::source::Source;
use crate::transform::TransformRegistry;
use crate::warehouse::{Warehouse, WarehouseLayout};
use crate::watermark::WatermarkStore;

/// Layout used by test warehouses.
pub fn test_layout() -> WarehouseLayout {
    WarehouseLayout {
        project_id: "test_project".to_string(),
        dataset_id: "analytics".to_string(),
        staging_dataset_id: "staging_tables".to_string(),
    }
}

/// Retries without waiting so tests exercising transient failures stay fast.
pub fn immediate_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        delay_ms: 0,
    }
}

/// Builder of [`SyncPipeline`]s with test friendly defaults.
///
/// Defaults: the built-in transforms, a single `products` table, immediate retries and the default
/// watermark settings.
pub struct TestPipelineBuilder<S, W, M> {
    source: S,
    warehouse: W,
    watermark_store: M,
    tables: Vec<TableConfig>,
    max_concurrent_tables: u16,
    max_extracted_rows: u64,
    watermark: WatermarkConfig,
    registry: TransformRegistry,
}

impl<S, W, M> TestPipelineBuilder<S, W, M>
where
    S: Source + Send + Sync + 'static,
    W: Warehouse + Send + Sync + 'static,
    M: WatermarkStore + Send + Sync + 'static,
{
    pub fn new(source: S, warehouse: W, watermark_store: M) -> Self {
        Self {
            source,
            warehouse,
            watermark_store,
            tables: vec![TableConfig::new("products")],
            max_concurrent_tables: PipelineConfig::DEFAULT_MAX_CONCURRENT_TABLES,
            max_extracted_rows: PipelineConfig::DEFAULT_MAX_EXTRACTED_ROWS,
            watermark: WatermarkConfig::default(),
            registry: TransformRegistry::with_builtins(),
        }
    }

    /// Replaces the table list with default configs for `tables`.
    pub fn with_tables(mut self, tables: &[&str]) -> Self {
        self.tables = tables.iter().map(|name| TableConfig::new(*name)).collect();
        self
    }

    pub fn with_table_configs(mut self, tables: Vec<TableConfig>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_max_concurrent_tables(mut self, max_concurrent_tables: u16) -> Self {
        self.max_concurrent_tables = max_concurrent_tables;
        self
    }

    pub fn with_max_extracted_rows(mut self, max_extracted_rows: u64) -> Self {
        self.max_extracted_rows = max_extracted_rows;
        self
    }

    pub fn with_default_lookback_days(mut self, days: u32) -> Self {
        self.watermark.default_lookback_days = days;
        self
    }

    pub fn with_registry(mut self, registry: TransformRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> EtlResult<SyncPipeline<S, W, M>> {
        let config = PipelineConfig {
            tables: self.tables,
            max_concurrent_tables: self.max_concurrent_tables,
            max_extracted_rows: self.max_extracted_rows,
            extract_retry: immediate_retry(RetryConfig::DEFAULT_MAX_RETRIES),
            load_retry: immediate_retry(RetryConfig::DEFAULT_MAX_RETRIES),
        };

        let context = SyncContext {
            source: self.source,
            warehouse: self.warehouse,
            watermark_store: self.watermark_store,
            layout: test_layout(),
        };

        SyncPipeline::new(context, config, self.watermark, self.registry)
    }
}
