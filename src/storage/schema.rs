//! Database schema definitions.

use sqlx::SqlitePool;

use crate::storage::StorageError;

/// SQL statement for creating the signals table.
///
/// `ts` holds Unix microseconds (UTC). `ecg_samples` is a JSON array so
/// sample order survives the round trip. The AUTOINCREMENT id doubles as the
/// insertion-order tie-break for equal timestamps.
pub const SIGNALS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS signals (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id  INTEGER NOT NULL,
    heartbeat   REAL NOT NULL,
    pulse       REAL NOT NULL,
    ts          INTEGER NOT NULL,
    ecg_samples TEXT NOT NULL DEFAULT '[]'
);
"#;

/// Covering index for both query shapes (per patient, newest first).
pub const SIGNALS_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_signals_patient_ts
    ON signals (patient_id, ts DESC, id DESC);
"#;

/// Initialize the database schema.
///
/// Creates all necessary tables and indexes if they don't exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(SIGNALS_TABLE_DDL).execute(pool).await?;
    sqlx::query(SIGNALS_INDEX_DDL).execute(pool).await?;

    tracing::info!("Database schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_initialization() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'signals'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_signals_patient_ts'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();
    }
}
