//! Data persistence layer.
//!
//! `RecordStore` is the canonical home of catalog records. Every operation is
//! keyed by character id and linearizable per key; the store never resurrects
//! a record once `delete_by_id` has returned it.

pub mod local;
pub mod memory;

pub use local::LocalStorage;
pub use memory::MemoryStore;

use crate::catalog::{CatalogRecord, CharacterId, RecordField};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("duplicate id: {0}")]
    Duplicate(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new record. Fails with `Duplicate` if the id already exists.
    async fn insert(&self, record: &CatalogRecord) -> Result<()>;

    async fn get(&self, id: &CharacterId) -> Result<Option<CatalogRecord>>;

    /// Apply one field write and return the record as it was before it.
    /// `None` means no record with that id exists and nothing was written.
    async fn update_field(
        &self,
        id: &CharacterId,
        field: &RecordField,
    ) -> Result<Option<CatalogRecord>>;

    /// Remove a record, returning what was removed
    async fn delete_by_id(&self, id: &CharacterId) -> Result<Option<CatalogRecord>>;
}
