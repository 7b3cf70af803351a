use chrono::{Duration, Utc};
use etl::pipeline::{TableOutcome, TableStatus};
use etl::source::memory::MemorySource;
use etl::test_utils::fixtures::{event_row, events_builder, instant, product_row, products_builder};
use etl::test_utils::pipeline::{TestPipelineBuilder, test_layout};
use etl::types::{Cell, TableName, TableRow};
use etl::warehouse::memory::MemoryWarehouse;
use etl::watermark::memory::MemoryWatermarkStore;
use etl::watermark::{WatermarkStore, format_watermark, parse_watermark};
use telemetry::tracing::init_test_tracing;

const WATERMARK_NAME: &str = "last_extracted_at";

#[tokio::test(flavor = "multi_thread")]
async fn products_without_updated_at_merge_only_new_rows() {
    init_test_tracing();

    let watermark = instant("2024-03-10T00:00:00Z");
    let source = MemorySource::new();
    source
        .insert_table(
            TableName::public("products"),
            products_builder()
                .row(product_row(1, "lamp", instant("2024-03-01T00:00:00Z")))
                .row(product_row(2, "chair", instant("2024-03-11T08:00:00Z")))
                .build(),
        )
        .await;
    let warehouse = MemoryWarehouse::new();
    let store = MemoryWatermarkStore::new();
    store
        .set(WATERMARK_NAME, &format_watermark(watermark))
        .await
        .unwrap();

    let pipeline = TestPipelineBuilder::new(source, warehouse.clone(), store.clone())
        .with_tables(&["products"])
        .build()
        .unwrap();
    let report = pipeline.run().await.unwrap();

    assert!(report.is_completed());
    assert_eq!(report.watermark, watermark);
    assert!(matches!(
        report.tables[0].status,
        TableStatus::Done(TableOutcome::Merged { rows: 1 })
    ));

    let layout = test_layout();
    let destination = warehouse
        .table(&layout.destination("products"))
        .await
        .unwrap();
    assert_eq!(
        destination.column_names().collect::<Vec<_>>(),
        vec![
            "id",
            "category_id",
            "name",
            "description",
            "created_at",
            "updated_at",
            "deleted_at"
        ]
    );
    assert_eq!(
        destination.rows(),
        &[TableRow::new(vec![
            Cell::I64(2),
            Cell::I64(1),
            "chair".into(),
            "chair description".into(),
            Cell::TimestampTz(instant("2024-03-11T08:00:00Z")),
            Cell::Null,
            Cell::Null,
        ])]
    );
    assert_eq!(warehouse.row_count(&layout.staging("products")).await, 0);

    let statements = warehouse.statements().await;
    assert!(statements.iter().any(|sql| sql.starts_with("merge")));
    assert!(statements.last().unwrap().starts_with("truncate table"));

    let stored = store.get(WATERMARK_NAME).await.unwrap().unwrap();
    assert_eq!(parse_watermark(&stored).unwrap(), report.started_at);
}

#[tokio::test(flavor = "multi_thread")]
async fn events_without_changes_skip_transform_and_load() {
    init_test_tracing();

    let source = MemorySource::new();
    source
        .insert_table(
            TableName::public("events"),
            events_builder()
                .row(event_row(1, "concert", instant("2023-01-01T00:00:00Z")))
                .build(),
        )
        .await;
    let warehouse = MemoryWarehouse::new();
    let store = MemoryWatermarkStore::new();

    let pipeline = TestPipelineBuilder::new(source, warehouse.clone(), store.clone())
        .with_tables(&["events"])
        .build()
        .unwrap();
    let report = pipeline.run().await.unwrap();

    assert!(report.is_completed());
    assert!(matches!(
        report.tables[0].status,
        TableStatus::Done(TableOutcome::NoChanges)
    ));
    assert!(warehouse.statements().await.is_empty());
    assert!(store.get(WATERMARK_NAME).await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn first_run_uses_the_default_lookback() {
    init_test_tracing();

    let source = MemorySource::new();
    let now = Utc::now();
    source
        .insert_table(
            TableName::public("products"),
            products_builder()
                .row(product_row(1, "recent", now - Duration::days(2)))
                .row(product_row(2, "ancient", now - Duration::days(30)))
                .build(),
        )
        .await;
    let warehouse = MemoryWarehouse::new();

    let pipeline = TestPipelineBuilder::new(source, warehouse.clone(), MemoryWatermarkStore::new())
        .with_default_lookback_days(20)
        .build()
        .unwrap();
    let report = pipeline.run().await.unwrap();

    assert_eq!(report.watermark, report.started_at - Duration::days(20));
    assert_eq!(
        warehouse
            .row_count(&test_layout().destination("products"))
            .await,
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rerunning_with_the_same_watermark_is_idempotent() {
    init_test_tracing();

    let watermark = instant("2024-03-10T00:00:00Z");
    let source = MemorySource::new();
    source
        .insert_table(
            TableName::public("products"),
            products_builder()
                .row(product_row(1, "lamp", instant("2024-03-12T00:00:00Z")))
                .row(product_row(2, "chair", instant("2024-03-13T00:00:00Z")))
                .build(),
        )
        .await;
    let warehouse = MemoryWarehouse::new();
    let store = MemoryWatermarkStore::new();
    let pipeline = TestPipelineBuilder::new(source, warehouse.clone(), store.clone())
        .build()
        .unwrap();
    let destination = test_layout().destination("products");

    store
        .set(WATERMARK_NAME, &format_watermark(watermark))
        .await
        .unwrap();
    pipeline.run().await.unwrap();
    let first = warehouse.table(&destination).await;

    store
        .set(WATERMARK_NAME, &format_watermark(watermark))
        .await
        .unwrap();
    pipeline.run().await.unwrap();
    let second = warehouse.table(&destination).await;

    assert_eq!(first, second);
    assert_eq!(second.map(|batch| batch.len()), Some(2));
}
