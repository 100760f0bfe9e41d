use loader::error::ErrorKind;
use loader::load::merge::merge_into_target;
use loader::store::{KeyConstraint, TableStore};
use loader::test_utils::database::{spawn_test_database, test_table_name};
use loader::types::{Cell, ColumnSchema, ColumnType, TableRow, TableSchema};
use loader::validation::ensure_unique_keys;
use telemetry::tracing::init_test_tracing;

fn schema() -> TableSchema {
    TableSchema::new(vec![
        ColumnSchema::key("id", ColumnType::Text),
        ColumnSchema::value("amount", ColumnType::BigInt),
    ])
}

fn row(id: &str, amount: i64) -> TableRow {
    TableRow::new(vec![Cell::from(id), Cell::I64(amount)])
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_updates_matched_inserts_unmatched_and_keeps_the_rest() {
    init_test_tracing();
    let database = spawn_test_database().await;
    let mut store = database.store().await;

    let target = test_table_name("numbers");
    let staging = target.with_prefix("temp_");

    store
        .replace_table(&target, &schema(), KeyConstraint::Enforced)
        .await
        .unwrap();
    store
        .replace_table(&staging, &schema(), KeyConstraint::Unenforced)
        .await
        .unwrap();
    for row in [row("K1", 5), row("K3", 1)] {
        store.insert_row(&target, &schema(), &row).await.unwrap();
    }
    for row in [row("K1", 7), row("K2", 9)] {
        store.insert_row(&staging, &schema(), &row).await.unwrap();
    }

    let merged = merge_into_target(&mut store, &staging, &target, &schema())
        .await
        .unwrap();

    assert_eq!(merged, 2);
    assert_eq!(
        store.fetch_rows(&target, &schema()).await.unwrap(),
        vec![row("K1", 7), row("K2", 9), row("K3", 1)]
    );

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn staging_without_primary_key_reports_duplicates_to_the_validator() {
    init_test_tracing();
    let database = spawn_test_database().await;
    let mut store = database.store().await;

    let staging = test_table_name("temp_numbers");
    store
        .replace_table(&staging, &schema(), KeyConstraint::Unenforced)
        .await
        .unwrap();
    for row in [row("K1", 1), row("K1", 2), row("K2", 3)] {
        store.insert_row(&staging, &schema(), &row).await.unwrap();
    }

    let err = ensure_unique_keys(&mut store, &staging, &["id".to_owned()])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateKeyViolation);
    let duplicate = err.duplicate_key().unwrap();
    assert_eq!(duplicate.key, "(K1)");
    assert_eq!(duplicate.count, 2);

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rolled_back_transaction_leaves_no_trace() {
    init_test_tracing();
    let database = spawn_test_database().await;
    let mut store = database.store().await;
    let table = test_table_name("numbers");

    store.begin().await.unwrap();
    store
        .replace_table(&table, &schema(), KeyConstraint::Enforced)
        .await
        .unwrap();
    store.insert_row(&table, &schema(), &row("K1", 1)).await.unwrap();
    store.rollback().await.unwrap();

    let err = store.count_rows(&table).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreQueryFailed);

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn null_cells_are_bound_with_their_column_type() {
    init_test_tracing();
    let database = spawn_test_database().await;
    let mut store = database.store().await;
    let table = test_table_name("numbers");

    store
        .replace_table(&table, &schema(), KeyConstraint::Enforced)
        .await
        .unwrap();
    store
        .insert_row(&table, &schema(), &TableRow::new(vec![Cell::from("K1"), Cell::Null]))
        .await
        .unwrap();

    assert_eq!(
        store.fetch_rows(&table, &schema()).await.unwrap(),
        vec![TableRow::new(vec![Cell::from("K1"), Cell::Null])]
    );

    database.cleanup().await;
}
