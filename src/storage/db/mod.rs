//! Database backends.
//!
//! Currently supports SQLite through sqlx. Another backend only needs to
//! implement [`SignalStore`](crate::storage::SignalStore).
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:data/icu.db?mode=rwc").await?;
//! let id = pool.write(&signal).await?;
//! ```

mod sqlite;

pub use sqlite::{DEFAULT_MAX_CONNECTIONS, SqlitePool};
