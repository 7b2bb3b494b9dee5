use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{ProcessingError, Result};
use crate::models::{HourlyKey, HourlyRecord};
use crate::storage::{HourlyStore, ParquetWriter, StoreLock};
use crate::utils::constants::{PARQUET_EXTENSION, PART_FILE_PREFIX};

/// Summary of a store directory.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreInfo {
    pub parts: usize,
    pub records: usize,
    pub rows_on_disk: i64,
    pub bytes_on_disk: u64,
    pub first_hour: Option<DateTime<Utc>>,
    pub last_hour: Option<DateTime<Utc>>,
}

impl StoreInfo {
    pub fn summary(&self) -> String {
        let range = match (self.first_hour, self.last_hour) {
            (Some(first), Some(last)) => format!("{} .. {}", first, last),
            _ => "empty".to_string(),
        };
        format!(
            "Store Summary:\n\
            - Part files: {}\n\
            - Hourly records: {}\n\
            - Rows on disk: {}\n\
            - Size: {:.2} MB\n\
            - Range: {}",
            self.parts,
            self.records,
            self.rows_on_disk,
            self.bytes_on_disk as f64 / 1_048_576.0,
            range
        )
    }
}

/// Directory of Parquet part files forming the unified hourly table.
///
/// Every write lands in a new `part-NNNNNNNN.parquet`, written to a temporary
/// file in the same directory and renamed into place. On open, parts are
/// replayed in sequence order so a later part overrides earlier rows for the
/// same (hour, location).
pub struct ParquetStore {
    dir: PathBuf,
    writer: ParquetWriter,
    records: BTreeMap<HourlyKey, HourlyRecord>,
    parts: Vec<(u64, PathBuf)>,
    next_seq: u64,
    lock: Option<StoreLock>,
    /// Set when the in-memory table could not be brought back in line with disk.
    poisoned: bool,
}

impl ParquetStore {
    /// Open for writing. Fails with `StoreLocked` while another writer holds the directory.
    pub fn open(dir: &Path, writer: ParquetWriter) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let lock = StoreLock::acquire(dir)?;
        let mut store = Self::load(dir, writer)?;
        store.lock = Some(lock);
        Ok(store)
    }

    /// Open without taking the writer lock; writes are refused.
    pub fn open_read_only(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(ProcessingError::MissingData(format!(
                "Store directory {} does not exist",
                dir.display()
            )));
        }
        Self::load(dir, ParquetWriter::new())
    }

    fn load(dir: &Path, writer: ParquetWriter) -> Result<Self> {
        let parts = list_parts(dir)?;
        let records = replay_parts(&writer, &parts)?;
        debug!(
            "Loaded {} hourly records from {} parts in {}",
            records.len(),
            parts.len(),
            dir.display()
        );

        let next_seq = parts.last().map(|(seq, _)| seq + 1).unwrap_or(0);
        Ok(Self {
            dir: dir.to_path_buf(),
            writer,
            records,
            parts,
            next_seq,
            lock: None,
            poisoned: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    fn ensure_consistent(&self) -> Result<()> {
        if self.poisoned {
            return Err(ProcessingError::Config(format!(
                "Store {} is out of sync with disk after a failed rewrite; reopen it",
                self.dir.display()
            )));
        }
        Ok(())
    }

    /// Reload parts and records from disk, the source of truth after a
    /// rewrite that stopped half way.
    fn resync(&mut self) -> Result<()> {
        let parts = list_parts(&self.dir)?;
        self.records = replay_parts(&self.writer, &parts)?;
        if let Some((seq, _)) = parts.last() {
            self.next_seq = self.next_seq.max(seq + 1);
        }
        self.parts = parts;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_consistent()?;
        if self.lock.is_none() {
            return Err(ProcessingError::Config(format!(
                "Store {} was opened read-only",
                self.dir.display()
            )));
        }
        Ok(())
    }

    /// Write one part atomically: temp file in the store directory, fsync, rename.
    fn write_part(&mut self, records: &[HourlyRecord]) -> Result<()> {
        let seq = self.next_seq;
        let final_path = self.dir.join(part_name(seq));

        let temp = NamedTempFile::new_in(&self.dir)?;
        self.writer.write_to(records, BufWriter::new(temp.as_file()))?;
        temp.as_file().sync_all()?;
        temp.persist(&final_path).map_err(|e| ProcessingError::Io(e.error))?;

        self.parts.push((seq, final_path));
        self.next_seq += 1;
        Ok(())
    }

    fn remove_parts(&mut self, parts: Vec<(u64, PathBuf)>) -> Result<()> {
        for (_, path) in parts {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn rewrite(
        &mut self,
        records: &[HourlyRecord],
        chunk_size: usize,
        old_parts: Vec<(u64, PathBuf)>,
    ) -> Result<usize> {
        let mut written = 0;
        for chunk in records.chunks(chunk_size.max(1)) {
            self.write_part(chunk)?;
            written += chunk.len();
        }

        self.remove_parts(old_parts)?;
        self.records = records.iter().map(|r| (r.key(), r.clone())).collect();
        Ok(written)
    }

    /// Rewrite the current table into bulk chunks, dropping superseded rows.
    pub fn compact(&mut self, chunk_size: usize) -> Result<usize> {
        let records: Vec<HourlyRecord> = self.records.values().cloned().collect();
        let before = self.parts.len();
        let written = self.replace_all(&records, chunk_size)?;
        info!("Compacted {} parts into {}", before, self.parts.len());
        Ok(written)
    }

    pub fn info(&self) -> Result<StoreInfo> {
        self.ensure_consistent()?;
        let mut rows_on_disk = 0;
        let mut bytes_on_disk = 0;
        for (_, path) in &self.parts {
            let file_info = self.writer.get_file_info(path)?;
            rows_on_disk += file_info.total_rows;
            bytes_on_disk += file_info.file_size;
        }

        Ok(StoreInfo {
            parts: self.parts.len(),
            records: self.records.len(),
            rows_on_disk,
            bytes_on_disk,
            first_hour: self.records.keys().next().map(|(ts, _)| *ts),
            last_hour: self.records.keys().next_back().map(|(ts, _)| *ts),
        })
    }
}

impl HourlyStore for ParquetStore {
    fn get(&self, key: &HourlyKey) -> Result<Option<HourlyRecord>> {
        self.ensure_consistent()?;
        Ok(self.records.get(key).cloned())
    }

    fn put_batch(&mut self, records: &[HourlyRecord]) -> Result<()> {
        self.ensure_writable()?;
        if records.is_empty() {
            return Ok(());
        }
        self.write_part(records)?;
        for record in records {
            self.records.insert(record.key(), record.clone());
        }
        Ok(())
    }

    /// New chunks are written first and the old parts removed afterwards, so
    /// an interrupted rebuild leaves every hour either old or new, never torn.
    fn replace_all(&mut self, records: &[HourlyRecord], chunk_size: usize) -> Result<usize> {
        self.ensure_writable()?;
        let old_parts = std::mem::take(&mut self.parts);

        let result = self.rewrite(records, chunk_size, old_parts);
        if let Err(e) = &result {
            warn!("Rewrite of {} failed: {}", self.dir.display(), e);
            if let Err(resync_err) = self.resync() {
                warn!("Could not reload {}: {}", self.dir.display(), resync_err);
                self.records.clear();
                self.parts.clear();
                self.poisoned = true;
            }
        }
        result
    }

    fn load_all(&self) -> Result<Vec<HourlyRecord>> {
        self.ensure_consistent()?;
        Ok(self.records.values().cloned().collect())
    }

    fn reset(&mut self) -> Result<()> {
        self.ensure_writable()?;
        let parts = std::mem::take(&mut self.parts);
        self.remove_parts(parts)?;
        self.records.clear();
        info!("Reset store {}", self.dir.display());
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        self.ensure_consistent()?;
        Ok(self.records.len())
    }
}

fn part_name(seq: u64) -> String {
    format!("{}{:08}.{}", PART_FILE_PREFIX, seq, PARQUET_EXTENSION)
}

fn parse_part_seq(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_prefix(PART_FILE_PREFIX)?
        .strip_suffix(&format!(".{}", PARQUET_EXTENSION))?
        .parse()
        .ok()
}

/// Replay parts in sequence order; later rows override earlier ones.
fn replay_parts(
    writer: &ParquetWriter,
    parts: &[(u64, PathBuf)],
) -> Result<BTreeMap<HourlyKey, HourlyRecord>> {
    let mut records = BTreeMap::new();
    for (_, path) in parts {
        for record in writer.read_records(path)? {
            records.insert(record.key(), record);
        }
    }
    Ok(records)
}

fn list_parts(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut parts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if let Some(seq) = parse_part_seq(&path) {
            parts.push((seq, path));
        }
    }
    parts.sort();
    Ok(parts)
}
