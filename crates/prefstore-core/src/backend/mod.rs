//! Backend stores
//!
//! A backend is the native key-value persistence behind one preferences
//! store. It only knows how to get, set, remove and enumerate values by
//! key; transactions and notifications live in `Preferences`/`Editor`.
//!
//! ## Adapters
//!
//! - `MemoryBackend`: process-local map, nothing persisted
//! - `JsonFileBackend`: one JSON dictionary file per store, atomic writes
//! - `SqliteBackend`: rows in a shared SQLite database, one namespace per store

pub mod file;
pub mod memory;
pub mod schema;
pub mod sqlite;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::StorageResult;
use crate::value::PrefValue;

pub use file::JsonFileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// Native key-value storage for a single store
///
/// Methods take `&self`: implementations own their synchronization, the way
/// a platform preference service does. Each individual call is atomic per
/// key; nothing spans keys.
pub trait Backend: Send + Sync {
    /// Snapshot of every stored entry
    fn get_all(&self) -> StorageResult<BTreeMap<String, PrefValue>>;

    /// Raw stored value for `key`, if any
    fn get(&self, key: &str) -> StorageResult<Option<PrefValue>>;

    /// Whether `key` holds a value of any shape
    fn contains(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Store `value` under `key`, replacing whatever was there
    fn set(&self, key: &str, value: PrefValue) -> StorageResult<()>;

    fn remove_key(&self, key: &str) -> StorageResult<()>;

    fn get_string(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(match self.get(key)? {
            Some(PrefValue::String(s)) => Some(s),
            _ => None,
        })
    }

    fn get_int(&self, key: &str) -> StorageResult<Option<i32>> {
        Ok(match self.get(key)? {
            Some(PrefValue::Int(i)) => Some(i),
            _ => None,
        })
    }

    fn get_long(&self, key: &str) -> StorageResult<Option<i64>> {
        Ok(match self.get(key)? {
            Some(PrefValue::Long(l)) => Some(l),
            _ => None,
        })
    }

    fn get_float(&self, key: &str) -> StorageResult<Option<f32>> {
        Ok(match self.get(key)? {
            Some(PrefValue::Float(f)) => Some(f),
            _ => None,
        })
    }

    fn get_boolean(&self, key: &str) -> StorageResult<Option<bool>> {
        Ok(match self.get(key)? {
            Some(PrefValue::Boolean(b)) => Some(b),
            _ => None,
        })
    }

    fn get_string_set(&self, key: &str) -> StorageResult<Option<BTreeSet<String>>> {
        Ok(match self.get(key)? {
            Some(PrefValue::StringSet(set)) => Some(set),
            _ => None,
        })
    }

    fn set_string(&self, key: &str, value: &str) -> StorageResult<()> {
        self.set(key, PrefValue::String(value.to_string()))
    }

    fn set_int(&self, key: &str, value: i32) -> StorageResult<()> {
        self.set(key, PrefValue::Int(value))
    }

    fn set_long(&self, key: &str, value: i64) -> StorageResult<()> {
        self.set(key, PrefValue::Long(value))
    }

    fn set_float(&self, key: &str, value: f32) -> StorageResult<()> {
        self.set(key, PrefValue::Float(value))
    }

    fn set_boolean(&self, key: &str, value: bool) -> StorageResult<()> {
        self.set(key, PrefValue::Boolean(value))
    }

    fn set_string_set(&self, key: &str, value: &BTreeSet<String>) -> StorageResult<()> {
        self.set(key, PrefValue::StringSet(value.clone()))
    }
}

/// Which backend adapter a store uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Shared SQLite database in the data directory
    #[default]
    Sqlite,
    /// One JSON file per store in the data directory
    Json,
    /// Nothing persisted; lives as long as the process
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "sqlite",
            BackendKind::Json => "json",
            BackendKind::Memory => "memory",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(BackendKind::Sqlite),
            "json" => Ok(BackendKind::Json),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!(
                "Unknown backend '{}'. Valid backends: sqlite, json, memory",
                other
            )),
        }
    }
}
