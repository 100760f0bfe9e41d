use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// Connects to the database holding the target tables.
///
/// A load runs on a single connection, so the pool is kept small: `max_connections`
/// only matters when several jobs share the pool.
pub async fn connect_to_database(
    config: &PgConnectionConfig,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .min_connections(0)
        .max_connections(max_connections)
        .connect_with(config.with_db())
        .await?;

    info!(host = %config.host, database = %config.name, "connected to store database");

    Ok(pool)
}
