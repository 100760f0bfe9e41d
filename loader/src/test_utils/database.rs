use config::shared::{IntoConnectOptions, PgConnectionConfig};
use postgres::sqlx::test_utils::{create_pg_database, drop_pg_database, local_pg_connection_config};
use sqlx::{Executor, PgPool};

use crate::store::postgres::PgTableStore;
use crate::types::TableName;

/// Schema every test table is created in.
pub const TEST_DATABASE_SCHEMA: &str = "test";

/// Creates a [`TableName`] in the test schema.
pub fn test_table_name(name: &str) -> TableName {
    TableName::new(TEST_DATABASE_SCHEMA, name)
}

/// A uniquely named Postgres database that lives for one test.
///
/// Call [`TestDatabase::cleanup`] at the end of the test to drop it.
pub struct TestDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl TestDatabase {
    /// Returns a store running on its own pool, so that a second store on the same
    /// database can observe what the first one has committed.
    pub async fn store(&self) -> PgTableStore {
        let pool = PgPool::connect_with(self.config.with_db())
            .await
            .expect("Failed to connect to the test database");

        PgTableStore::new(pool)
    }

    pub async fn cleanup(self) {
        self.pool.close().await;
        drop_pg_database(&self.config).await;
    }
}

/// Creates a fresh database with the test schema.
///
/// # Panics
/// Panics if the database or the schema cannot be created.
pub async fn spawn_test_database() -> TestDatabase {
    let config = local_pg_connection_config();
    let pool = create_pg_database(&config).await;

    pool.execute(&*format!("create schema {TEST_DATABASE_SCHEMA}"))
        .await
        .expect("Failed to create test schema");

    TestDatabase { config, pool }
}
