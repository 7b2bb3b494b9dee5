use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::{HourlyKey, HourlyRecord};
use crate::storage::HourlyStore;

/// Non-persistent store used for dry runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: BTreeMap<HourlyKey, HourlyRecord>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of atomic writes performed (one per chunk or batch).
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl HourlyStore for MemoryStore {
    fn get(&self, key: &HourlyKey) -> Result<Option<HourlyRecord>> {
        Ok(self.records.get(key).cloned())
    }

    fn put_batch(&mut self, records: &[HourlyRecord]) -> Result<()> {
        for record in records {
            self.records.insert(record.key(), record.clone());
        }
        self.writes += 1;
        Ok(())
    }

    fn replace_all(&mut self, records: &[HourlyRecord], chunk_size: usize) -> Result<usize> {
        self.records.clear();
        for chunk in records.chunks(chunk_size.max(1)) {
            self.put_batch(chunk)?;
        }
        Ok(records.len())
    }

    fn load_all(&self) -> Result<Vec<HourlyRecord>> {
        Ok(self.records.values().cloned().collect())
    }

    fn reset(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }
}
