use etl::error::{ErrorKind, EtlError};
use etl::failpoints::{
    EXTRACT_BEFORE_QUERY, LOAD_AFTER_STAGING, LOAD_BEFORE_TRUNCATE, WATERMARK_BEFORE_COMMIT,
};
use etl::pipeline::{TablePhase, TableStatus};
use etl::source::memory::MemorySource;
use etl::test_utils::failpoints::FailpointGuard;
use etl::test_utils::fixtures::{instant, product_row, products_builder};
use etl::test_utils::pipeline::{TestPipelineBuilder, test_layout};
use etl::types::{Cell, TableName};
use etl::warehouse::memory::MemoryWarehouse;
use etl::watermark::memory::MemoryWatermarkStore;
use etl::watermark::{WatermarkStore, format_watermark};
use telemetry::tracing::init_test_tracing;

const WATERMARK_NAME: &str = "last_extracted_at";

async fn products_source(name: &str) -> MemorySource {
    let source = MemorySource::new();
    source
        .insert_table(
            TableName::public("products"),
            products_builder()
                .row(product_row(1, name, instant("2024-03-12T00:00:00Z")))
                .build(),
        )
        .await;
    source
}

async fn watermark_store() -> MemoryWatermarkStore {
    let store = MemoryWatermarkStore::new();
    store
        .set(
            WATERMARK_NAME,
            &format_watermark(instant("2024-03-10T00:00:00Z")),
        )
        .await
        .unwrap();
    store
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_left_in_staging_lose_against_a_later_run() {
    init_test_tracing();
    let guard = FailpointGuard::setup(&[(LOAD_AFTER_STAGING, "return")]);

    let source = products_source("stale").await;
    let warehouse = MemoryWarehouse::new();
    let store = watermark_store().await;
    let before = store.get(WATERMARK_NAME).await.unwrap();

    let pipeline = TestPipelineBuilder::new(source.clone(), warehouse.clone(), store.clone())
        .build()
        .unwrap();
    let report = pipeline.run().await.unwrap();

    match &report.tables[0].status {
        TableStatus::Failed { phase, error } => {
            assert_eq!(*phase, TablePhase::Loading);
            assert_eq!(error.kind(), ErrorKind::LoadFailed);
        }
        other => panic!("unexpected status {other:?}"),
    }
    let layout = test_layout();
    assert_eq!(warehouse.row_count(&layout.staging("products")).await, 1);
    assert_eq!(warehouse.row_count(&layout.destination("products")).await, 0);
    assert_eq!(store.get(WATERMARK_NAME).await.unwrap(), before);

    guard.disable(LOAD_AFTER_STAGING);
    source
        .insert_table(
            TableName::public("products"),
            products_builder()
                .row(product_row(1, "fresh", instant("2024-03-12T00:00:00Z")))
                .build(),
        )
        .await;

    let report = pipeline.run().await.unwrap();
    assert!(report.is_completed());

    let destination = warehouse
        .table(&layout.destination("products"))
        .await
        .unwrap();
    let name = destination.column_index("name").unwrap();
    assert_eq!(
        destination.column_values(name).collect::<Vec<_>>(),
        vec![&Cell::from("fresh")]
    );
    assert_eq!(warehouse.row_count(&layout.staging("products")).await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_staging_cleanup_fails_the_table_after_the_merge() {
    init_test_tracing();
    let _guard = FailpointGuard::setup(&[(LOAD_BEFORE_TRUNCATE, "return")]);

    let warehouse = MemoryWarehouse::new();
    let pipeline = TestPipelineBuilder::new(
        products_source("lamp").await,
        warehouse.clone(),
        watermark_store().await,
    )
    .build()
    .unwrap();
    let report = pipeline.run().await.unwrap();

    let error = report.tables[0].error().unwrap();
    assert_eq!(error.kind(), ErrorKind::LoadFailed);
    assert!(report.committed_watermark.is_none());

    let layout = test_layout();
    assert_eq!(warehouse.row_count(&layout.destination("products")).await, 1);
    assert_eq!(warehouse.row_count(&layout.staging("products")).await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn watermark_commit_failpoint_fails_the_run() {
    init_test_tracing();
    let _guard = FailpointGuard::setup(&[(WATERMARK_BEFORE_COMMIT, "return")]);

    let store = watermark_store().await;
    let before = store.get(WATERMARK_NAME).await.unwrap();
    let pipeline = TestPipelineBuilder::new(
        products_source("lamp").await,
        MemoryWarehouse::new(),
        store.clone(),
    )
    .build()
    .unwrap();

    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WatermarkCommitFailed);
    assert_eq!(
        err.cause().map(EtlError::kind),
        Some(ErrorKind::WithNoRetry)
    );
    assert_eq!(store.get(WATERMARK_NAME).await.unwrap(), before);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_extraction_failures_recover_within_the_retry_budget() {
    init_test_tracing();
    let _guard = FailpointGuard::setup(&[(EXTRACT_BEFORE_QUERY, "2*return(timed_retry)")]);

    let warehouse = MemoryWarehouse::new();
    let pipeline = TestPipelineBuilder::new(
        products_source("lamp").await,
        warehouse.clone(),
        watermark_store().await,
    )
    .build()
    .unwrap();
    let report = pipeline.run().await.unwrap();

    assert!(report.is_completed());
    assert_eq!(
        warehouse
            .row_count(&test_layout().destination("products"))
            .await,
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn permanent_extraction_failures_are_not_retried() {
    init_test_tracing();
    let _guard = FailpointGuard::setup(&[(EXTRACT_BEFORE_QUERY, "return")]);

    let source = products_source("lamp").await;
    let pipeline = TestPipelineBuilder::new(
        source.clone(),
        MemoryWarehouse::new(),
        watermark_store().await,
    )
    .build()
    .unwrap();
    let report = pipeline.run().await.unwrap();

    let error = report.tables[0].error().unwrap();
    assert_eq!(error.kind(), ErrorKind::ExtractionFailed);
    assert_eq!(
        error.cause().map(EtlError::kind),
        Some(ErrorKind::WithNoRetry)
    );
    assert_eq!(source.fetch_count(&TableName::public("products")).await, 0);
}
