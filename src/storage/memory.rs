//! In-memory record store
//!
//! Each key is guarded by its own map shard, so concurrent writes to the same
//! id apply in a single order while writes to different ids do not contend.

use super::{RecordStore, Result, StorageError};
use crate::catalog::{CatalogRecord, CharacterId, RecordField};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<CharacterId, CatalogRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, record: &CatalogRecord) -> Result<()> {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Duplicate(record.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: &CharacterId) -> Result<Option<CatalogRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn update_field(
        &self,
        id: &CharacterId,
        field: &RecordField,
    ) -> Result<Option<CatalogRecord>> {
        Ok(self.records.get_mut(id).map(|mut entry| {
            let previous = entry.value().clone();
            entry.value_mut().apply(field);
            previous
        }))
    }

    async fn delete_by_id(&self, id: &CharacterId) -> Result<Option<CatalogRecord>> {
        Ok(self.records.remove(id).map(|(_, record)| record))
    }
}
