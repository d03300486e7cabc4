//! Named sequence counters
//!
//! Every call to [`SequenceAllocator::allocate`] returns a value strictly
//! greater than any value previously returned for the same name. The counter
//! row is created on first use, through the same atomic operation as every
//! later call.

use crate::storage::{Result, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Value handed out by the first allocation of a fresh counter.
/// With it the first catalog id is "00".
pub const FIRST_SEQUENCE_VALUE: u64 = 0;

#[async_trait]
pub trait SequenceAllocator: Send + Sync {
    /// Atomically advance the named counter and return its new value
    async fn allocate(&self, name: &str) -> Result<u64>;
}

/// Process-local counters
#[derive(Debug, Default)]
pub struct MemorySequence {
    counters: DashMap<String, AtomicU64>,
}

impl MemorySequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a counter so its next allocation returns `next`
    pub fn starting_at(name: &str, next: u64) -> Self {
        let seq = Self::new();
        seq.counters.insert(name.to_string(), AtomicU64::new(next));
        seq
    }
}

#[async_trait]
impl SequenceAllocator for MemorySequence {
    async fn allocate(&self, name: &str) -> Result<u64> {
        let counter = self
            .counters
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(FIRST_SEQUENCE_VALUE));

        // an exhausted counter stays exhausted instead of wrapping to 0
        let allocated =
            counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_add(1));
        allocated.map_err(|_| StorageError::InvalidData(format!("sequence '{}' exhausted", name)))
    }
}
