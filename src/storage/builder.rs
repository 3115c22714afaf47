//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage collaborator
//! and a handles struct that owns its lifecycle.

use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::storage::StorageError;
use crate::storage::db::{DEFAULT_MAX_CONNECTIONS, SqlitePool};
use crate::storage::memory::MemorySignalStore;
use crate::storage::signal_store::SignalStore;

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    driver: DatabaseDriver,
    dsn: String,
    max_connections: u32,
}

impl StorageBuilder {
    /// Create a new storage builder for a SQLite URL.
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            driver: DatabaseDriver::Sqlite,
            dsn: dsn.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Builder for the process-local store.
    pub fn memory() -> Self {
        Self {
            driver: DatabaseDriver::Memory,
            dsn: String::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Select the backend.
    pub fn driver(mut self, driver: DatabaseDriver) -> Self {
        self.driver = driver;
        self
    }

    /// Set the maximum number of pooled connections (SQLite only).
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Build the storage layer and return handles.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        match self.driver {
            DatabaseDriver::Sqlite => {
                ensure_parent_dir(&self.dsn)?;
                let pool = SqlitePool::connect_with(&self.dsn, self.max_connections).await?;
                tracing::info!(dsn = %self.dsn, "SQLite signal store ready");
                Ok(StorageHandles {
                    store: Arc::new(pool.clone()),
                    sqlite: Some(pool),
                })
            }
            DatabaseDriver::Memory => {
                tracing::warn!("Using in-memory signal store; data is lost on restart");
                Ok(StorageHandles {
                    store: Arc::new(MemorySignalStore::new()),
                    sqlite: None,
                })
            }
        }
    }
}

/// Create the parent directory of a file-backed SQLite URL if needed.
fn ensure_parent_dir(dsn: &str) -> Result<(), StorageError> {
    let Some(path) = sqlite_file_path(dsn) else {
        return Ok(());
    };
    if let Some(parent) = std::path::Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Extract the file path from `sqlite:<path>[?params]`, if it names a file.
fn sqlite_file_path(dsn: &str) -> Option<&str> {
    let rest = dsn
        .strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

/// Handles to the storage collaborator.
pub struct StorageHandles {
    /// Store used by the gateway and query service.
    pub store: Arc<dyn SignalStore>,
    sqlite: Option<SqlitePool>,
}

impl std::fmt::Debug for StorageHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandles")
            .field("sqlite", &self.sqlite.is_some())
            .finish_non_exhaustive()
    }
}

impl StorageHandles {
    /// Gracefully shutdown the storage layer.
    ///
    /// Closes the connection pool, waiting for in-flight queries.
    pub async fn shutdown(self) -> Result<(), StorageError> {
        if let Some(pool) = self.sqlite {
            pool.close().await;
        }
        Ok(())
    }
}
