use config::shared::TableConfig;
use etl::error::{ErrorKind, EtlError};
use etl::pipeline::{TableOutcome, TablePhase, TableStatus};
use etl::source::memory::MemorySource;
use etl::test_utils::fixtures::{
    BatchBuilder, instant, product_row, products_builder, user_row, users_builder,
};
use etl::test_utils::pipeline::{TestPipelineBuilder, test_layout};
use etl::transform::TransformRegistry;
use etl::types::{Cell, TableName, Type};
use etl::warehouse::memory::MemoryWarehouse;
use etl::watermark::memory::MemoryWatermarkStore;
use etl::watermark::{WatermarkStore, format_watermark};
use telemetry::tracing::init_test_tracing;

const WATERMARK_NAME: &str = "last_extracted_at";

async fn store_at(value: &str) -> MemoryWatermarkStore {
    let store = MemoryWatermarkStore::new();
    store
        .set(WATERMARK_NAME, &format_watermark(instant(value)))
        .await
        .unwrap();
    store
}

async fn source_with_products() -> MemorySource {
    let source = MemorySource::new();
    source
        .insert_table(
            TableName::public("products"),
            products_builder()
                .row(product_row(1, "lamp", instant("2024-03-12T00:00:00Z")))
                .build(),
        )
        .await;
    source
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_table_does_not_block_siblings_nor_advance_the_watermark() {
    init_test_tracing();

    // `users` is configured but missing from the source.
    let source = source_with_products().await;
    let warehouse = MemoryWarehouse::new();
    let store = store_at("2024-03-10T00:00:00Z").await;
    let before = store.get(WATERMARK_NAME).await.unwrap();

    let pipeline = TestPipelineBuilder::new(source, warehouse.clone(), store.clone())
        .with_tables(&["products", "users"])
        .build()
        .unwrap();
    let report = pipeline.run().await.unwrap();

    assert!(!report.is_completed());
    assert!(report.tables[0].is_done());
    match &report.tables[1].status {
        TableStatus::Failed { phase, error } => {
            assert_eq!(*phase, TablePhase::Extracting);
            assert_eq!(error.kind(), ErrorKind::ExtractionFailed);
            assert_eq!(
                error.cause().map(EtlError::kind),
                Some(ErrorKind::SourceSchemaError)
            );
        }
        other => panic!("unexpected status {other:?}"),
    }
    assert_eq!(
        warehouse
            .row_count(&test_layout().destination("products"))
            .await,
        1
    );
    assert_eq!(store.get(WATERMARK_NAME).await.unwrap(), before);

    let err = report.into_result().unwrap_err();
    assert_eq!(err.kinds(), vec![ErrorKind::ExtractionFailed]);
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_source_failures_are_retried() {
    init_test_tracing();

    let source = source_with_products().await;
    source
        .fail_next_fetches(
            TableName::public("products"),
            2,
            ErrorKind::SourceConnectionFailed,
        )
        .await;
    let warehouse = MemoryWarehouse::new();

    let pipeline = TestPipelineBuilder::new(
        source.clone(),
        warehouse.clone(),
        store_at("2024-03-10T00:00:00Z").await,
    )
    .build()
    .unwrap();
    let report = pipeline.run().await.unwrap();

    assert!(report.is_completed());
    assert_eq!(source.fetch_count(&TableName::public("products")).await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn watermark_commit_failure_fails_the_run_but_keeps_loaded_rows() {
    init_test_tracing();

    let warehouse = MemoryWarehouse::new();
    let store = store_at("2024-03-10T00:00:00Z").await;
    store.fail_next_sets(1).await;

    let pipeline =
        TestPipelineBuilder::new(source_with_products().await, warehouse.clone(), store.clone())
            .build()
            .unwrap();
    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WatermarkCommitFailed);
    assert_eq!(
        warehouse
            .row_count(&test_layout().destination("products"))
            .await,
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn extraction_over_the_row_bound_fails_the_table() {
    init_test_tracing();

    let source = MemorySource::new();
    source
        .insert_table(
            TableName::public("products"),
            products_builder()
                .row(product_row(1, "a", instant("2024-03-12T00:00:00Z")))
                .row(product_row(2, "b", instant("2024-03-12T00:00:00Z")))
                .row(product_row(3, "c", instant("2024-03-12T00:00:00Z")))
                .build(),
        )
        .await;
    let warehouse = MemoryWarehouse::new();

    let pipeline = TestPipelineBuilder::new(
        source,
        warehouse.clone(),
        store_at("2024-03-10T00:00:00Z").await,
    )
    .with_max_extracted_rows(2)
    .build()
    .unwrap();
    let report = pipeline.run().await.unwrap();

    let error = report.tables[0].error().unwrap();
    assert_eq!(error.kind(), ErrorKind::ExtractionFailed);
    assert_eq!(
        error.cause().map(EtlError::kind),
        Some(ErrorKind::ExtractionLimitExceeded)
    );
    assert!(warehouse.statements().await.is_empty());
}

#[tokio::test]
async fn configured_table_without_transform_is_rejected() {
    let err = TestPipelineBuilder::new(
        MemorySource::new(),
        MemoryWarehouse::new(),
        MemoryWatermarkStore::new(),
    )
    .with_tables(&["products", "invoices"])
    .build()
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MissingTransform);
}

#[tokio::test]
async fn invalid_pipeline_config_is_rejected() {
    let err = TestPipelineBuilder::new(
        MemorySource::new(),
        MemoryWarehouse::new(),
        MemoryWatermarkStore::new(),
    )
    .with_max_concurrent_tables(0)
    .build()
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test]
async fn out_of_range_lookback_is_rejected() {
    let err = TestPipelineBuilder::new(
        MemorySource::new(),
        MemoryWarehouse::new(),
        MemoryWatermarkStore::new(),
    )
    .with_default_lookback_days(u32::MAX)
    .build()
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
}

#[tokio::test(flavor = "multi_thread")]
async fn users_from_another_schema_get_a_fullname() {
    init_test_tracing();

    let source = MemorySource::new();
    source
        .insert_table(
            TableName::new("crm", "users"),
            users_builder()
                .row(user_row(1, Some("Ada"), Some("Lovelace"), instant("2024-03-12T00:00:00Z")))
                .row(user_row(2, Some("Grace"), None, instant("2024-03-12T00:00:00Z")))
                .build(),
        )
        .await;
    let warehouse = MemoryWarehouse::new();

    let mut users = TableConfig::new("users");
    users.schema = "crm".to_string();
    let pipeline = TestPipelineBuilder::new(
        source,
        warehouse.clone(),
        store_at("2024-03-10T00:00:00Z").await,
    )
    .with_table_configs(vec![users])
    .with_max_concurrent_tables(1)
    .build()
    .unwrap();
    let report = pipeline.run().await.unwrap();
    assert!(report.is_completed());

    let destination = warehouse
        .table(&test_layout().destination("users"))
        .await
        .unwrap();
    let fullname = destination.column_index("fullname").unwrap();
    let names: Vec<&Cell> = destination.column_values(fullname).collect();
    assert_eq!(names, vec![&Cell::from("Ada Lovelace"), &Cell::Null]);
}

fn transactions_source_tables() -> Vec<(&'static str, BatchBuilder)> {
    let at = Cell::TimestampTz(instant("2024-03-12T00:00:00Z"));

    vec![
        (
            "product_transactions",
            BatchBuilder::new()
                .not_null("id", Type::INT8)
                .column("user_id", Type::INT8)
                .column("transaction_method_id", Type::INT8)
                .column("total_amount", Type::INT8)
                .not_null("created_at", Type::TIMESTAMPTZ)
                .row(vec![
                    Cell::I64(10),
                    Cell::I64(7),
                    Cell::I64(1),
                    Cell::I64(300),
                    at.clone(),
                ]),
        ),
        (
            "product_transaction_items",
            BatchBuilder::new()
                .not_null("id", Type::INT8)
                .column("product_transaction_id", Type::INT8)
                .column("product_variant_id", Type::INT8)
                .column("quantity", Type::INT4)
                .not_null("created_at", Type::TIMESTAMPTZ)
                .row(vec![
                    Cell::I64(100),
                    Cell::I64(10),
                    Cell::I64(50),
                    Cell::I32(3),
                    at.clone(),
                ]),
        ),
        (
            "product_variants",
            BatchBuilder::new()
                .not_null("id", Type::INT8)
                .column("product_id", Type::INT8)
                .column("size", Type::TEXT)
                .not_null("created_at", Type::TIMESTAMPTZ)
                .row(vec![Cell::I64(50), Cell::I64(5), "L".into(), at.clone()]),
        ),
    ]
}

#[tokio::test(flavor = "multi_thread")]
async fn join_with_an_empty_input_is_skipped() {
    init_test_tracing();

    let source = MemorySource::new();
    for (table, builder) in transactions_source_tables() {
        source
            .insert_table(TableName::public(table), builder.build())
            .await;
    }
    // `products` exists but has no change since the watermark.
    source
        .insert_table(
            TableName::public("products"),
            products_builder()
                .row(product_row(5, "old", instant("2024-01-01T00:00:00Z")))
                .build(),
        )
        .await;
    let warehouse = MemoryWarehouse::new();

    let pipeline = TestPipelineBuilder::new(
        source,
        warehouse.clone(),
        store_at("2024-03-10T00:00:00Z").await,
    )
    .with_tables(&["product_transactions"])
    .build()
    .unwrap();
    let report = pipeline.run().await.unwrap();

    assert!(report.is_completed());
    assert!(matches!(
        report.tables[0].status,
        TableStatus::Done(TableOutcome::NoChanges)
    ));
    assert!(warehouse.statements().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn product_transactions_are_joined_and_merged() {
    init_test_tracing();

    let source = MemorySource::new();
    for (table, builder) in transactions_source_tables() {
        source
            .insert_table(TableName::public(table), builder.build())
            .await;
    }
    source
        .insert_table(
            TableName::public("products"),
            products_builder()
                .row(product_row(5, "shirt", instant("2024-03-12T00:00:00Z")))
                .build(),
        )
        .await;
    let warehouse = MemoryWarehouse::new();

    let pipeline = TestPipelineBuilder::new(
        source,
        warehouse.clone(),
        store_at("2024-03-10T00:00:00Z").await,
    )
    .with_tables(&["product_transactions"])
    .with_registry(TransformRegistry::with_builtins())
    .build()
    .unwrap();
    let report = pipeline.run().await.unwrap();
    assert!(report.is_completed());

    let destination = warehouse
        .table(&test_layout().destination("product_transactions"))
        .await
        .unwrap();
    assert_eq!(
        destination.column_names().collect::<Vec<_>>(),
        vec![
            "id",
            "user_id",
            "product_id",
            "category_id",
            "transaction_method_id",
            "quantity",
            "total_amount"
        ]
    );
    assert_eq!(
        destination.rows()[0].values(),
        &[
            Cell::I64(10),
            Cell::I64(7),
            Cell::I64(5),
            Cell::I64(1),
            Cell::I64(1),
            Cell::I32(3),
            Cell::I64(300),
        ]
    );
}
