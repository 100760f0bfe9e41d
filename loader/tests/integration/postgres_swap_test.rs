use loader::error::ErrorKind;
use loader::load::swap::SwapLoader;
use loader::store::TableStore;
use loader::test_utils::database::{TEST_DATABASE_SCHEMA, spawn_test_database, test_table_name};
use loader::types::TableName;
use sqlx::{Executor, PgPool};
use telemetry::tracing::init_test_tracing;

use crate::common::{CommittedView, Observation, ObservedStore};

/// Postgres `lock_not_available`, raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// Postgres `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

impl CommittedView for PgPool {
    async fn committed_count(&self, table: &TableName) -> Observation {
        let Ok(mut transaction) = self.begin().await else {
            return Observation::Missing;
        };
        if sqlx::query("set local lock_timeout = '200ms'")
            .execute(&mut *transaction)
            .await
            .is_err()
        {
            return Observation::Missing;
        }

        let sql = format!("select count(*) from {}", table.as_quoted_identifier());
        let result = sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&mut *transaction)
            .await;
        let _ = transaction.rollback().await;

        match result {
            Ok(count) => Observation::Rows(u64::try_from(count).unwrap_or_default()),
            Err(sqlx::Error::Database(err)) if err.code().as_deref() == Some(LOCK_NOT_AVAILABLE) => {
                Observation::Blocked
            }
            Err(sqlx::Error::Database(err)) if err.code().as_deref() == Some(UNDEFINED_TABLE) => {
                Observation::Missing
            }
            Err(err) => panic!("unexpected error while observing {table}: {err}"),
        }
    }
}

async fn create_sessions(pool: &PgPool) {
    pool.execute(&*format!(
        "create table {TEST_DATABASE_SCHEMA}.sessions (user_id text, session_id text, channel text)"
    ))
    .await
    .unwrap();
    pool.execute(&*format!(
        "insert into {TEST_DATABASE_SCHEMA}.sessions values \
         ('u1', 's1', 'web'), ('u2', 's2', 'app'), ('u3', 's3', 'ads')"
    ))
    .await
    .unwrap();
}

fn sessions_query() -> String {
    format!("select user_id, session_id, channel from {TEST_DATABASE_SCHEMA}.sessions")
}

#[tokio::test(flavor = "multi_thread")]
async fn swap_exchanges_live_and_shadow_tables_on_postgres() {
    init_test_tracing();
    let database = spawn_test_database().await;
    create_sessions(&database.pool).await;
    database
        .pool
        .execute(&*format!(
            "create table {TEST_DATABASE_SCHEMA}.session_summary as \
             select user_id, session_id, channel from {TEST_DATABASE_SCHEMA}.sessions limit 1"
        ))
        .await
        .unwrap();

    let mut store = database.store().await;
    let target = test_table_name("session_summary");
    let loader = SwapLoader::new(target.clone(), "temp_", vec!["session_id".to_owned()]);

    let summary = loader.load(&mut store, &sessions_query()).await.unwrap();

    assert_eq!(summary.rows_loaded, 3);
    assert_eq!(summary.target_rows, 3);
    assert_eq!(store.count_rows(loader.shadow()).await.unwrap(), 1);

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_shadow_keys_abort_the_postgres_swap() {
    init_test_tracing();
    let database = spawn_test_database().await;
    create_sessions(&database.pool).await;

    let mut store = database.store().await;
    let target = test_table_name("session_summary");
    let loader = SwapLoader::new(target.clone(), "temp_", vec!["channel".to_owned()]);
    let query = format!(
        "select user_id, session_id, 'web' as channel from {TEST_DATABASE_SCHEMA}.sessions"
    );

    let err = loader.load(&mut store, &query).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DuplicateKeyViolation);
    assert_eq!(err.duplicate_key().unwrap().key, "(web)");
    assert_eq!(err.duplicate_key().unwrap().count, 3);
    // Nothing was committed, not even the empty target.
    assert_eq!(database.pool.committed_count(&target).await, Observation::Missing);

    database.cleanup().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_readers_only_see_complete_tables() {
    init_test_tracing();
    let database = spawn_test_database().await;
    create_sessions(&database.pool).await;
    database
        .pool
        .execute(&*format!(
            "create table {TEST_DATABASE_SCHEMA}.session_summary (user_id text, session_id text, channel text)"
        ))
        .await
        .unwrap();

    let target = test_table_name("session_summary");
    let mut observed = ObservedStore::new(
        database.store().await,
        database.pool.clone(),
        target.clone(),
    );

    SwapLoader::new(target.clone(), "temp_", vec!["session_id".to_owned()])
        .load(&mut observed, &sessions_query())
        .await
        .unwrap();

    let observations = observed.observations();
    assert!(
        observations
            .iter()
            .all(|seen| matches!(
                seen,
                Observation::Rows(0) | Observation::Rows(3) | Observation::Blocked
            )),
        "unexpected intermediate state: {observations:?}"
    );
    assert_eq!(observations.last(), Some(&Observation::Rows(3)));

    database.cleanup().await;
}
