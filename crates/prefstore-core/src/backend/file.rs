//! JSON file backend
//!
//! Each store is a single JSON dictionary on disk, loaded once at open and
//! kept in memory. Every write rewrites the file atomically (write to temp
//! file, then rename) so a crash never leaves a half-written store.
//!
//! File layout (`<data_dir>/<store>.json`):
//!
//! ```json
//! {
//!   "theme": { "type": "string", "value": "dark" },
//!   "launches": { "type": "int", "value": 3 }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::Backend;
use crate::error::{StorageError, StorageResult};
use crate::value::PrefValue;

/// Backend persisting one store as a JSON file
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, PrefValue>>,
}

impl JsonFileBackend {
    /// Open the store file at `path`, starting empty if it doesn't exist
    ///
    /// Returns an error if the file exists but can't be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let entries = load_entries(&path)?;
        debug!(path = %path.display(), entries = entries.len(), "opened json store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, PrefValue>) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|e| StorageError::InvalidFormat {
            path: self.path.clone(),
            details: e.to_string(),
        })?;
        atomic_write(&self.path, &bytes)
    }
}

impl Backend for JsonFileBackend {
    fn get_all(&self) -> StorageResult<BTreeMap<String, PrefValue>> {
        Ok(self.entries.lock()?.clone())
    }

    fn get(&self, key: &str) -> StorageResult<Option<PrefValue>> {
        Ok(self.entries.lock()?.get(key).cloned())
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.lock()?.contains_key(key))
    }

    fn set(&self, key: &str, value: PrefValue) -> StorageResult<()> {
        let mut entries = self.entries.lock()?;
        let previous = entries.insert(key.to_string(), value);

        if let Err(e) = self.persist(&entries) {
            // Keep memory and disk in agreement
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_key(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.lock()?;
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

fn load_entries(path: &Path) -> StorageResult<BTreeMap<String, PrefValue>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => {
            return Err(StorageError::ReadError {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }

    serde_json::from_slice(&bytes).map_err(|e| StorageError::InvalidFormat {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;
    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|e| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}
