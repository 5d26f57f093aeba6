//! In-memory backend

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::Backend;
use crate::error::StorageResult;
use crate::value::PrefValue;

/// Backend that keeps everything in a process-local map
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, PrefValue>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-populated with `entries`
    pub fn with_entries(entries: BTreeMap<String, PrefValue>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }
}

impl Backend for MemoryBackend {
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
        self.entries.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_key(&self, key: &str) -> StorageResult<()> {
        self.entries.lock()?.remove(key);
        Ok(())
    }
}
