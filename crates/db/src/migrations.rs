use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of migrations that have been applied to `pool`.
pub async fn applied_count(pool: &DbPool) -> Result<i64, sqlx::Error> {
    if !table_exists(pool, "_sqlx_migrations").await? {
        return Ok(0);
    }

    sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
}

/// Whether the `plugin_kv` table the bot stores overrides in is present.
pub async fn kv_table_ready(pool: &DbPool) -> Result<bool, sqlx::Error> {
    table_exists(pool, "plugin_kv").await
}

async fn table_exists(pool: &DbPool, name: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}
