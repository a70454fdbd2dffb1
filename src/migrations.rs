//! Database migrations using sqlx built-in migration system.
//!
//! Migrations are stored in the `migrations/` directory.
//! Each migration file is named `NNNN_description.sql`.

use sqlx::SqlitePool;
use sqlx::migrate::Migrator;

use crate::errors::BotResult;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> BotResult<()> {
    if table_exists(pool, "users").await && !table_exists(pool, "_sqlx_migrations").await {
        log::info!("Detected database from the previous bot version, converting timestamps");
    }

    MIGRATOR.run(pool).await?;

    log::info!("Database migrations completed successfully");
    Ok(())
}

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table: &str) -> bool {
    let result = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
    )
    .bind(table)
    .fetch_one(pool)
    .await;

    matches!(result, Ok(count) if count > 0)
}
