//! Database module
//!
//! Database connection and schema verification utilities.
//! The schema itself lives in raw SQL files under migrations/.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Tables the ledger store needs
pub const LEDGER_TABLES: &[&str] = &[
    "accounts",
    "card_to_account",
    "phone_to_account",
    "transfers",
    "transfer_outbox",
];

/// Tables the queue store needs
pub const BROKER_TABLES: &[&str] = &[
    "broker_exchanges",
    "broker_queues",
    "broker_bindings",
    "broker_messages",
];

/// Open a connection pool
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await
}

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Check if every table in `required_tables` exists
pub async fn check_schema(pool: &PgPool, required_tables: &[&str]) -> Result<bool, sqlx::Error> {
    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(*table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
