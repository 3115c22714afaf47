//! Storage Layer
//!
//! The storage engine is an external collaborator behind the [`SignalStore`]
//! trait. Two backends ship with the crate:
//!
//! - [`SqlitePool`]: sqlx-backed SQLite with WAL and a per-patient index
//! - [`MemorySignalStore`]: process-local store for development and tests
//!
//! # Components
//!
//! - [`Signal`] / [`Page`] / [`PageRequest`]: data model
//! - [`StorageBuilder`] / [`StorageHandles`]: initialization and lifecycle management

mod builder;
pub mod db;
mod error;
mod memory;
mod schema;
mod signal_store;
mod types;

pub use builder::{StorageBuilder, StorageHandles};
pub use db::SqlitePool;
pub use error::StorageError;
pub use memory::MemorySignalStore;
pub use signal_store::{SignalSlice, SignalStore};
pub use types::{Page, PageRequest, PatientId, Signal, StoredId, from_micros, to_micros};
