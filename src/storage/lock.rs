use fs4::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ProcessingError, Result};
use crate::utils::constants::LOCK_FILE;

/// Exclusive writer lock on a store directory.
///
/// Held as an advisory lock on `.lock`, so the OS releases it when the
/// process exits for any reason. The file itself stays behind and only
/// records the pid of the last holder.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    file: File,
}

impl StoreLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs4::lock_contended_error().kind() {
                return Err(ProcessingError::StoreLocked(dir.display().to_string()));
            }
            return Err(e.into());
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        debug!("Acquired store lock {}", path.display());

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release store lock {}: {}", self.path.display(), e);
        }
    }
}
