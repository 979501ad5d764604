use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Tables the embedded migrations own.
pub const MANAGED_TABLES: &[&str] = &["customer", "customer_order", "auth_session"];

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of `MANAGED_TABLES` present; lower than its length means migrations
/// have not been applied to this database.
pub async fn managed_table_count(pool: &DbPool) -> Result<i64, sqlx::Error> {
    let mut present = 0;
    for table in MANAGED_TABLES {
        let found: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool)
        .await?;
        present += found;
    }
    Ok(present)
}
