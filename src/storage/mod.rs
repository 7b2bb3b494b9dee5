pub mod lock;
pub mod memory;
pub mod observation_writer;
pub mod parquet_store;
pub mod parquet_writer;

pub use lock::StoreLock;
pub use memory::MemoryStore;
pub use observation_writer::ObservationWriter;
pub use parquet_store::{ParquetStore, StoreInfo};
pub use parquet_writer::{ParquetFileInfo, ParquetWriter};

use crate::error::Result;
use crate::models::{HourlyKey, HourlyRecord};

/// Persistent unified table keyed by (hour, location).
pub trait HourlyStore {
    fn get(&self, key: &HourlyKey) -> Result<Option<HourlyRecord>>;

    /// Insert or replace the given records as one atomic write.
    fn put_batch(&mut self, records: &[HourlyRecord]) -> Result<()>;

    /// Replace the whole table, writing `records` in chunks of `chunk_size`.
    /// Returns the number of records written.
    fn replace_all(&mut self, records: &[HourlyRecord], chunk_size: usize) -> Result<usize>;

    /// All records, ascending by hour then location.
    fn load_all(&self) -> Result<Vec<HourlyRecord>>;

    fn reset(&mut self) -> Result<()>;

    fn put(&mut self, record: HourlyRecord) -> Result<()> {
        self.put_batch(std::slice::from_ref(&record))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.load_all()?.len())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
