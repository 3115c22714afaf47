//! SQLite backend implementation using sqlx.
//!
//! Provides connection pooling and the [`SignalStore`] implementation for SQLite.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool as SqlxPool, SqlitePoolOptions,
    SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

use crate::storage::StorageError;
use crate::storage::schema::init_schema;
use crate::storage::signal_store::{SignalSlice, SignalStore};
use crate::storage::types::{PatientId, Signal, StoredId, from_micros};

/// Default maximum connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const SELECT_COLUMNS: &str = "SELECT id, patient_id, heartbeat, pulse, ts, ecg_samples FROM signals";

type SignalRow = (i64, i64, f64, f64, i64, String);

/// SQLite connection pool wrapper.
///
/// Wraps sqlx's SqlitePool with sensible defaults for WAL mode and connection pooling.
#[derive(Clone)]
pub struct SqlitePool {
    inner: SqlxPool,
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool").finish_non_exhaustive()
    }
}

impl SqlitePool {
    /// Connect to a SQLite database with the default pool size.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL, e.g., `sqlite:data/icu.db?mode=rwc`
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        Self::connect_with(url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect and make sure the schema exists.
    ///
    /// # Configuration
    ///
    /// - WAL journal mode for better concurrency
    /// - Normal synchronous mode for performance with durability
    /// - Create database if not exists
    pub async fn connect_with(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(DEFAULT_CONNECT_TIMEOUT)
            .connect_with(options)
            .await?;

        init_schema(&pool).await?;

        Ok(Self { inner: pool })
    }

    /// Get the underlying sqlx pool for direct query execution.
    #[inline]
    pub fn inner(&self) -> &SqlxPool {
        &self.inner
    }

    /// Close the connection pool gracefully.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    /// Check if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

fn row_to_signal(row: SignalRow) -> Result<Signal, StorageError> {
    let (id, patient_id, heartbeat, pulse, ts, ecg) = row;
    Ok(Signal {
        id,
        patient_id,
        heartbeat,
        pulse,
        timestamp: from_micros(ts)?,
        ecg_samples: serde_json::from_str(&ecg)?,
    })
}

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[async_trait]
impl SignalStore for SqlitePool {
    async fn write(&self, signal: &Signal) -> Result<StoredId, StorageError> {
        let ecg = serde_json::to_string(&signal.ecg_samples)?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO signals (patient_id, heartbeat, pulse, ts, ecg_samples)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(signal.patient_id)
        .bind(signal.heartbeat)
        .bind(signal.pulse)
        .bind(signal.timestamp_micros())
        .bind(ecg)
        .fetch_one(&self.inner)
        .await?;

        Ok(id)
    }

    async fn query_range(
        &self,
        patient_id: PatientId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        offset: u64,
        limit: u64,
    ) -> Result<SignalSlice, StorageError> {
        let start = start.and_utc().timestamp_micros();
        let end = end.and_utc().timestamp_micros();

        // One read transaction so the count and the window see the same snapshot.
        let mut tx = self.inner.begin().await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM signals WHERE patient_id = ? AND ts >= ? AND ts <= ?",
        )
        .bind(patient_id)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await?;

        let sql = format!(
            "{SELECT_COLUMNS} WHERE patient_id = ? AND ts >= ? AND ts <= ?
             ORDER BY ts DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows: Vec<SignalRow> = sqlx::query_as(&sql)
            .bind(patient_id)
            .bind(start)
            .bind(end)
            .bind(clamp_i64(limit))
            .bind(clamp_i64(offset))
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(SignalSlice {
            signals: rows
                .into_iter()
                .map(row_to_signal)
                .collect::<Result<_, _>>()?,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn query_latest(
        &self,
        patient_id: PatientId,
        offset: u64,
        limit: u64,
    ) -> Result<SignalSlice, StorageError> {
        let mut tx = self.inner.begin().await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signals WHERE patient_id = ?")
            .bind(patient_id)
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            "{SELECT_COLUMNS} WHERE patient_id = ? ORDER BY ts DESC, id DESC LIMIT ? OFFSET ?"
        );
        let rows: Vec<SignalRow> = sqlx::query_as(&sql)
            .bind(patient_id)
            .bind(clamp_i64(limit))
            .bind(clamp_i64(offset))
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(SignalSlice {
            signals: rows
                .into_iter()
                .map(row_to_signal)
                .collect::<Result<_, _>>()?,
            total: u64::try_from(total).unwrap_or(0),
        })
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.inner).await?;
        Ok(())
    }
}
