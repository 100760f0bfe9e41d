use config::shared::{RetentionConfig, RetentionOrder};
use loader::error::ErrorKind;
use loader::load::upsert::UpsertLoader;
use loader::normalize::{DailySeriesNormalizer, stock_price_schema};
use loader::store::TableStore;
use loader::test_utils::database::{spawn_test_database, test_table_name};
use loader::types::Batch;
use telemetry::tracing::init_test_tracing;

use crate::common::{SERIES_KEY, date, series_document, stock_row};

fn normalizer() -> DailySeriesNormalizer {
    DailySeriesNormalizer::new(
        "AAPL",
        SERIES_KEY,
        RetentionConfig {
            count: 90,
            order: RetentionOrder::SourceOrder,
        },
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_is_idempotent_on_postgres() {
    init_test_tracing();
    let database = spawn_test_database().await;
    let mut store = database.store().await;

    let target = test_table_name("stock_data");
    let loader = UpsertLoader::new(target.clone(), "temp_");
    let batch = normalizer()
        .normalize(&series_document(date("2024-01-03"), 3, "185.64"))
        .unwrap();

    let first = loader.load(&mut store, &batch).await.unwrap();
    let rows_after_first = store
        .fetch_rows(&target, &stock_price_schema())
        .await
        .unwrap();
    let second = loader.load(&mut store, &batch).await.unwrap();
    let rows_after_second = store
        .fetch_rows(&target, &stock_price_schema())
        .await
        .unwrap();

    assert_eq!(first.target_rows, 3);
    assert_eq!(second.target_rows, 3);
    assert_eq!(rows_after_first, rows_after_second);
    assert_eq!(
        rows_after_second,
        vec![
            stock_row("AAPL", "2024-01-01", "185.64"),
            stock_row("AAPL", "2024-01-02", "185.64"),
            stock_row("AAPL", "2024-01-03", "185.64"),
        ]
    );

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_batch_keys_leave_the_postgres_target_untouched() {
    init_test_tracing();
    let database = spawn_test_database().await;
    let mut store = database.store().await;

    let target = test_table_name("stock_data");
    let loader = UpsertLoader::new(target.clone(), "temp_");
    let initial = normalizer()
        .normalize(&series_document(date("2024-01-02"), 2, "185.64"))
        .unwrap();
    loader.load(&mut store, &initial).await.unwrap();

    let duplicated = Batch::new(
        stock_price_schema(),
        vec![
            stock_row("AAPL", "2024-01-05", "190.00"),
            stock_row("AAPL", "2024-01-05", "191.00"),
        ],
    )
    .unwrap();
    let err = loader.load(&mut store, &duplicated).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateKeyViolation);
    assert_eq!(
        err.duplicate_key().map(|duplicate| duplicate.key.as_str()),
        Some("(AAPL,2024-01-05)")
    );
    assert_eq!(
        store
            .fetch_rows(&target, &stock_price_schema())
            .await
            .unwrap(),
        vec![
            stock_row("AAPL", "2024-01-01", "185.64"),
            stock_row("AAPL", "2024-01-02", "185.64"),
        ]
    );

    database.cleanup().await;
}
