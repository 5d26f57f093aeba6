//! SQLite backend
//!
//! Stores live side by side in one database file (`preferences.db`), each
//! in its own namespace. Every set/remove is a single statement, so SQLite
//! gives per-key atomicity and last-writer-wins across processes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Mutex;

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::schema::{init_schema, needs_init};
use super::Backend;
use crate::error::{StorageError, StorageResult};
use crate::value::{PrefValue, ValueKind};

/// Backend storing one namespace of a SQLite database
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    store: String,
}

impl SqliteBackend {
    /// Open or create the database at `path` and bind to `store`
    pub fn open(path: &Path, store: impl Into<String>) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn, store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(store: impl Into<String>) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, store)
    }

    fn from_connection(conn: Connection, store: impl Into<String>) -> StorageResult<Self> {
        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        let store = store.into();
        debug!(store = %store, "opened sqlite store");

        Ok(Self {
            conn: Mutex::new(conn),
            store,
        })
    }

    /// Name of the namespace this backend reads and writes
    pub fn store(&self) -> &str {
        &self.store
    }
}

impl Backend for SqliteBackend {
    fn get_all(&self) -> StorageResult<BTreeMap<String, PrefValue>> {
        let conn = self.conn.lock()?;
        let mut stmt =
            conn.prepare("SELECT key, kind, value FROM preferences WHERE store = ?1")?;

        let rows = stmt.query_map(params![self.store], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Value>(2)?,
            ))
        })?;

        let mut entries = BTreeMap::new();
        for row in rows {
            let (key, kind, raw) = row?;
            let value = decode(&key, &kind, raw)?;
            entries.insert(key, value);
        }
        Ok(entries)
    }

    fn get(&self, key: &str) -> StorageResult<Option<PrefValue>> {
        let conn = self.conn.lock()?;
        let row = conn
            .query_row(
                "SELECT kind, value FROM preferences WHERE store = ?1 AND key = ?2",
                params![self.store, key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Value>(1)?)),
            )
            .optional()?;

        row.map(|(kind, raw)| decode(key, &kind, raw)).transpose()
    }

    fn contains(&self, key: &str) -> StorageResult<bool> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare("SELECT 1 FROM preferences WHERE store = ?1 AND key = ?2")?;
        Ok(stmt.exists(params![self.store, key])?)
    }

    fn set(&self, key: &str, value: PrefValue) -> StorageResult<()> {
        let kind = value.kind();
        let raw = encode(value)?;

        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO preferences (store, key, kind, value) VALUES (?1, ?2, ?3, ?4)",
            params![self.store, key, kind.as_str(), raw],
        )?;
        Ok(())
    }

    fn remove_key(&self, key: &str) -> StorageResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "DELETE FROM preferences WHERE store = ?1 AND key = ?2",
            params![self.store, key],
        )?;
        Ok(())
    }
}

fn encode(value: PrefValue) -> StorageResult<Value> {
    Ok(match value {
        PrefValue::String(s) => Value::Text(s),
        PrefValue::Int(i) => Value::Integer(i64::from(i)),
        PrefValue::Long(l) => Value::Integer(l),
        // SQLite turns a NaN REAL into NULL
        PrefValue::Float(f) if !f.is_finite() => Value::Text(f.to_string()),
        PrefValue::Float(f) => Value::Real(f64::from(f)),
        PrefValue::Boolean(b) => Value::Integer(i64::from(b)),
        PrefValue::StringSet(set) => {
            let json = serde_json::to_string(&set).map_err(|e| StorageError::CorruptEntry {
                key: String::new(),
                details: e.to_string(),
            })?;
            Value::Text(json)
        }
    })
}

fn decode(key: &str, kind: &str, raw: Value) -> StorageResult<PrefValue> {
    let corrupt = |details: String| StorageError::CorruptEntry {
        key: key.to_string(),
        details,
    };

    let kind = ValueKind::parse(kind).ok_or_else(|| corrupt(format!("unknown kind '{}'", kind)))?;

    match (kind, raw) {
        (ValueKind::String, Value::Text(s)) => Ok(PrefValue::String(s)),
        (ValueKind::Int, Value::Integer(i)) => i32::try_from(i)
            .map(PrefValue::Int)
            .map_err(|_| corrupt(format!("int out of range: {}", i))),
        (ValueKind::Long, Value::Integer(l)) => Ok(PrefValue::Long(l)),
        (ValueKind::Float, Value::Real(f)) => Ok(PrefValue::Float(f as f32)),
        (ValueKind::Float, Value::Integer(i)) => Ok(PrefValue::Float(i as f32)),
        (ValueKind::Float, Value::Text(s)) => match s.parse::<f32>() {
            Ok(f) if !f.is_finite() => Ok(PrefValue::Float(f)),
            _ => Err(corrupt(format!("float stored as text '{}'", s))),
        },
        (ValueKind::Boolean, Value::Integer(b)) => Ok(PrefValue::Boolean(b != 0)),
        (ValueKind::StringSet, Value::Text(json)) => serde_json::from_str::<BTreeSet<String>>(&json)
            .map(PrefValue::StringSet)
            .map_err(|e| corrupt(e.to_string())),
        (kind, other) => Err(corrupt(format!(
            "{} stored with SQLite type {}",
            kind,
            other.data_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::conformance;
    use tempfile::TempDir;

    #[test]
    fn test_missing_key_is_absent() {
        conformance::missing_key_is_absent(&SqliteBackend::open_in_memory("test").unwrap());
    }

    #[test]
    fn test_typed_round_trip() {
        conformance::typed_round_trip(&SqliteBackend::open_in_memory("test").unwrap());
    }

    #[test]
    fn test_overwrite_changes_shape() {
        conformance::overwrite_changes_shape(&SqliteBackend::open_in_memory("test").unwrap());
    }

    #[test]
    fn test_remove_key() {
        conformance::remove_key(&SqliteBackend::open_in_memory("test").unwrap());
    }

    #[test]
    fn test_non_finite_floats() {
        conformance::non_finite_floats(&SqliteBackend::open_in_memory("test").unwrap());
    }

    #[test]
    fn test_non_finite_floats_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("preferences.db");

        {
            let backend = SqliteBackend::open(&path, "app").unwrap();
            backend.set_float("nan", f32::NAN).unwrap();
            backend.set_float("inf", f32::INFINITY).unwrap();
        }

        let reopened = SqliteBackend::open(&path, "app").unwrap();
        assert!(reopened.get_float("nan").unwrap().unwrap().is_nan());
        assert_eq!(reopened.get_float("inf").unwrap(), Some(f32::INFINITY));

        // Enumeration still works, so the store can be cleared
        for key in reopened.get_all().unwrap().keys() {
            reopened.remove_key(key).unwrap();
        }
        assert!(reopened.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_stores_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("preferences.db");

        let app = SqliteBackend::open(&path, "app").unwrap();
        let ui = SqliteBackend::open(&path, "ui").unwrap();

        app.set_string("theme", "dark").unwrap();
        ui.set_string("theme", "light").unwrap();

        assert_eq!(app.get_string("theme").unwrap(), Some("dark".to_string()));
        assert_eq!(ui.get_string("theme").unwrap(), Some("light".to_string()));

        app.remove_key("theme").unwrap();
        assert!(!app.contains("theme").unwrap());
        assert!(ui.contains("theme").unwrap());
        assert_eq!(app.store(), "app");
    }

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("preferences.db");

        {
            let backend = SqliteBackend::open(&path, "app").unwrap();
            backend.set_boolean("onboarded", true).unwrap();
            backend.set_int("count", 3).unwrap();
        }

        let reopened = SqliteBackend::open(&path, "app").unwrap();
        assert_eq!(reopened.get_boolean("onboarded").unwrap(), Some(true));
        assert_eq!(reopened.get("count").unwrap(), Some(PrefValue::Int(3)));
    }

    #[test]
    fn test_unknown_kind_is_corrupt() {
        let backend = SqliteBackend::open_in_memory("app").unwrap();
        backend
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO preferences (store, key, kind, value) VALUES ('app', 'x', 'double', 1.0)",
                [],
            )
            .unwrap();

        let err = backend.get("x").unwrap_err();
        assert!(matches!(err, StorageError::CorruptEntry { .. }));
    }
}
