use crate::error::{ProcessingError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

/// Scratch directory for members extracted from zipped deliveries. Removed on drop.
pub struct TempFileManager {
    temp_dir: TempDir,
    extracted_files: HashMap<String, PathBuf>,
}

impl TempFileManager {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().map_err(|e| {
            ProcessingError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to create temporary directory: {}", e),
            ))
        })?;

        Ok(Self {
            temp_dir,
            extracted_files: HashMap::new(),
        })
    }

    pub fn temp_dir_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Extract every member whose name ends with `.{extension}`, in archive order.
    pub fn extract_with_extension(
        &mut self,
        zip_path: &Path,
        extension: &str,
    ) -> Result<Vec<PathBuf>> {
        let file = File::open(zip_path)?;
        let mut archive = ZipArchive::new(file)?;
        let suffix = format!(".{}", extension.to_lowercase());
        let mut extracted_paths = Vec::new();

        for i in 0..archive.len() {
            let mut zip_file = archive.by_index(i)?;
            if zip_file.is_dir() {
                continue;
            }

            let member_name = zip_file.name().to_string();
            if !member_name.to_lowercase().ends_with(&suffix) {
                continue;
            }

            let key = format!("{}::{}", zip_path.display(), member_name);
            if let Some(path) = self.extracted_files.get(&key) {
                extracted_paths.push(path.clone());
                continue;
            }

            // enclosed_name rejects absolute paths and `..` components
            let relative = zip_file.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
                ProcessingError::InvalidFormat(format!(
                    "Unsafe member path '{}' in archive '{}'",
                    member_name,
                    zip_path.display()
                ))
            })?;
            let dest_path = self
                .temp_dir
                .path()
                .join(format!("{}", self.extracted_files.len()))
                .join(relative);

            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut dest_file = File::create(&dest_path)?;
            let mut writer = BufWriter::new(&mut dest_file);
            std::io::copy(&mut zip_file, &mut writer)?;
            writer.flush()?;

            debug!("Extracted {} from {}", member_name, zip_path.display());
            self.extracted_files.insert(key, dest_path.clone());
            extracted_paths.push(dest_path);
        }

        Ok(extracted_paths)
    }

    pub fn extracted_count(&self) -> usize {
        self.extracted_files.len()
    }
}
