use config::shared::{RetentionConfig, RetentionOrder};
use loader::error::ErrorKind;
use loader::failpoints::{SWAP_LOAD__BEFORE_SWAP, UPSERT_LOAD__AFTER_MERGE};
use loader::load::swap::SwapLoader;
use loader::load::upsert::UpsertLoader;
use loader::normalize::{DailySeriesNormalizer, stock_price_schema};
use loader::store::KeyConstraint;
use loader::store::memory::MemoryTableStore;
use loader::test_utils::failpoints::CustomFailScenario;
use loader::types::TableName;
use telemetry::tracing::init_test_tracing;

use crate::common::{SERIES_KEY, date, series_document, session_row, session_summary_schema, stock_row};

#[tokio::test(flavor = "multi_thread")]
async fn error_after_merge_rolls_back_the_whole_upsert() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(UPSERT_LOAD__AFTER_MERGE, "return")]);

    let target: TableName = "dev.raw.stock_data".parse().unwrap();
    let mut store = MemoryTableStore::new();
    let previous = vec![stock_row("AAPL", "2023-12-29", "180.00")];
    store
        .seed_table(
            &target,
            stock_price_schema(),
            KeyConstraint::Enforced,
            previous.clone(),
        )
        .await
        .unwrap();

    let batch = DailySeriesNormalizer::new(
        "AAPL",
        SERIES_KEY,
        RetentionConfig {
            count: 90,
            order: RetentionOrder::SourceOrder,
        },
    )
    .normalize(&series_document(date("2024-01-03"), 3, "185.64"))
    .unwrap();

    let err = UpsertLoader::new(target.clone(), "temp_")
        .load(&mut store, &batch)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InjectedFailure);
    assert_eq!(store.committed_rows(&target).await, Some(previous));
    assert!(!store.in_transaction().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn store_error_before_swap_keeps_the_live_table() {
    init_test_tracing();
    let _scenario = CustomFailScenario::setup(&[(SWAP_LOAD__BEFORE_SWAP, "return(store)")]);

    let target: TableName = "dev.analytics.session_summary".parse().unwrap();
    let query = "select * from analytics.sessions";
    let live = vec![session_row("u1", "s1", "web", "2024-01-01 10:00:00")];

    let mut store = MemoryTableStore::new();
    store
        .seed_table(
            &target,
            session_summary_schema(),
            KeyConstraint::Unenforced,
            live.clone(),
        )
        .await
        .unwrap();
    store
        .register_query(
            query,
            session_summary_schema(),
            vec![session_row("u2", "s2", "app", "2024-01-02 10:00:00")],
        )
        .await;

    let loader = SwapLoader::new(target.clone(), "temp_", vec!["session_id".to_owned()]);
    let err = loader.load(&mut store, query).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StoreQueryFailed);
    assert_eq!(store.committed_rows(&target).await, Some(live));
    assert_eq!(store.committed_rows(loader.shadow()).await, None);
}
