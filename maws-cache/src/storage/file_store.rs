//! File-based storage with atomic, owner-only writes

use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::storage::permissions::{verify_or_repair, Requirement};
use crate::storage::{SecureStorage, StorageError};

/// Prefix of in-flight temporary files; never a valid key.
const TEMP_PREFIX: &str = ".maws-";

/// File-based storage rooted at a single directory
///
/// Writes go to a temporary file in the same directory, created with mode
/// 0600, and are renamed over the target so readers never see a partial file.
/// Reads refuse files that are accessible to group or other users and
/// cannot be narrowed back to 0600.
///
/// The caller is responsible for verifying `base_dir` itself.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn key_path(&self, key: &str) -> PathBuf {
        // Keys are single path components
        let mut safe_key = key.replace(['/', '\\'], "_");
        if safe_key.chars().all(|c| c == '.') {
            safe_key = safe_key.replace('.', "_");
        }
        self.base_dir.join(safe_key)
    }

    /// List stored keys in name order, skipping in-flight temporary files.
    pub fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();

        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with(TEMP_PREFIX) {
                    keys.push(name.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

impl SecureStorage for FileStorage {
    fn store(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.key_path(key);

        // NamedTempFile is created with mode 0600 on unix
        let mut file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&self.base_dir)?;

        file.write_all(value)?;
        file.as_file().sync_all()?;
        file.persist(&path)?;

        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.key_path(key);

        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        if !verify_or_repair(&path, Requirement::PrivateFile) {
            return Err(StorageError::AccessDenied(path));
        }

        fs::read(&path).map_err(|e| not_found_or_io(key, e))
    }

    fn modified(&self, key: &str) -> Result<DateTime<Utc>, StorageError> {
        let path = self.key_path(key);

        let modified = fs::metadata(&path)
            .and_then(|metadata| metadata.modified())
            .map_err(|e| not_found_or_io(key, e))?;

        Ok(DateTime::<Utc>::from(modified))
    }

    fn exists(&self, key: &str) -> bool {
        self.key_path(key).exists()
    }
}

fn not_found_or_io(key: &str, e: io::Error) -> StorageError {
    if e.kind() == io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}
