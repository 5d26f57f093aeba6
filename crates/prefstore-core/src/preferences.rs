//! Preferences facade
//!
//! `Preferences` is the read side of a store plus the entry point for
//! writes: typed getters with default fallback, an existence check, the
//! listener registry, and `edit()` to start a batch of changes.
//!
//! ## Usage
//!
//! ```ignore
//! let prefs = Preferences::new(Arc::new(MemoryBackend::new()));
//!
//! prefs.edit().put_int("launches", 1).put_string("theme", "dark").commit();
//!
//! let launches = prefs.get_int("launches", 0)?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::backend::Backend;
use crate::editor::Editor;
use crate::error::{PrefsError, Result};
use crate::listener::{ListenerRegistry, PreferenceChangeListener};
use crate::value::{FromPrefValue, PrefValue};

/// Name given to stores created without one
pub const DEFAULT_STORE: &str = "default";

/// Typed view over one backend store
pub struct Preferences {
    name: String,
    backend: Arc<dyn Backend>,
    listeners: ListenerRegistry,
}

impl Preferences {
    /// Wrap `backend` as the default store
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_name(DEFAULT_STORE, backend)
    }

    /// Wrap `backend` as the store called `name`
    pub fn with_name(name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.into(),
            backend,
            listeners: ListenerRegistry::new(),
        }
    }

    /// Store name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    /// Snapshot of every persisted entry, read from the backend each call
    pub fn get_all(&self) -> Result<BTreeMap<String, PrefValue>> {
        Ok(self.backend.get_all()?)
    }

    /// Read `key` as `T`, or return `default` if the key is absent
    ///
    /// The default is returned untouched whenever the backend reports the
    /// key missing. A present key whose value can't be read as `T` is an
    /// error, never a silent default.
    pub fn get<T: FromPrefValue>(&self, key: &str, default: T) -> Result<T> {
        if !self.backend.contains(key)? {
            return Ok(default);
        }

        match self.backend.get(key)? {
            // Removed between the two calls
            None => Ok(default),
            Some(value) => T::from_pref_value(value).map_err(|stored| PrefsError::Conversion {
                key: key.to_string(),
                expected: T::KIND,
                found: stored.kind(),
            }),
        }
    }

    /// Raw stored value, whatever its shape
    pub fn get_value(&self, key: &str) -> Result<Option<PrefValue>> {
        Ok(self.backend.get(key)?)
    }

    pub fn get_string(&self, key: &str, default: &str) -> Result<String> {
        self.get(key, default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i32) -> Result<i32> {
        self.get(key, default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> Result<i64> {
        self.get(key, default)
    }

    pub fn get_float(&self, key: &str, default: f32) -> Result<f32> {
        self.get(key, default)
    }

    pub fn get_boolean(&self, key: &str, default: bool) -> Result<bool> {
        self.get(key, default)
    }

    pub fn get_string_set(&self, key: &str, default: BTreeSet<String>) -> Result<BTreeSet<String>> {
        self.get(key, default)
    }

    /// Whether the backend holds a value for `key`
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.backend.contains(key)?)
    }

    /// Start a new batch of changes
    pub fn edit(&self) -> Editor<'_> {
        Editor::new(self)
    }

    /// Register `listener` for change callbacks
    ///
    /// Only a weak reference is kept: the caller must hold on to the `Arc`
    /// for as long as it wants callbacks.
    pub fn register_listener<L>(&self, listener: &Arc<L>)
    where
        L: PreferenceChangeListener + 'static,
    {
        self.listeners.register(listener);
    }

    /// Stop sending callbacks to `listener`
    pub fn unregister_listener<L>(&self, listener: &Arc<L>)
    where
        L: PreferenceChangeListener + 'static,
    {
        self.listeners.unregister(listener);
    }

    /// Number of registered listener entries (dead ones included until pruned)
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn notify(&self, key: &str) {
        self.listeners.notify(self, key);
    }
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences")
            .field("name", &self.name)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::value::ValueKind;

    fn prefs() -> Preferences {
        Preferences::new(Arc::new(MemoryBackend::new()))
    }

    fn seeded(entries: &[(&str, PrefValue)]) -> Preferences {
        let map = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Preferences::with_name("seeded", Arc::new(MemoryBackend::with_entries(map)))
    }

    #[test]
    fn test_missing_key_returns_defaults() {
        let prefs = prefs();
        let default_set: BTreeSet<String> = ["x".to_string()].into_iter().collect();

        assert!(!prefs.contains("k").unwrap());
        assert_eq!(prefs.get_string("k", "fallback").unwrap(), "fallback");
        assert_eq!(prefs.get_int("k", 7).unwrap(), 7);
        assert_eq!(prefs.get_long("k", -7).unwrap(), -7);
        assert_eq!(prefs.get_float("k", 1.5).unwrap(), 1.5);
        assert!(prefs.get_boolean("k", true).unwrap());
        assert_eq!(
            prefs.get_string_set("k", default_set.clone()).unwrap(),
            default_set
        );
        assert_eq!(prefs.get_value("k").unwrap(), None);
    }

    #[test]
    fn test_present_key_ignores_default() {
        let prefs = seeded(&[("volume", PrefValue::Int(0))]);

        assert!(prefs.contains("volume").unwrap());
        assert_eq!(prefs.get_int("volume", 11).unwrap(), 0);
    }

    #[test]
    fn test_type_mismatch_fails_loudly() {
        let prefs = seeded(&[("tags", PrefValue::String("a,b".to_string()))]);

        let err = prefs.get_string_set("tags", BTreeSet::new()).unwrap_err();
        match err {
            PrefsError::Conversion {
                key,
                expected,
                found,
            } => {
                assert_eq!(key, "tags");
                assert_eq!(expected, ValueKind::StringSet);
                assert_eq!(found, ValueKind::String);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_string_set_read_as_string_fails() {
        let prefs = seeded(&[("tags", PrefValue::StringSet(BTreeSet::new()))]);

        assert!(matches!(
            prefs.get_string("tags", ""),
            Err(PrefsError::Conversion { .. })
        ));
    }

    #[test]
    fn test_integer_widening() {
        let prefs = seeded(&[
            ("small", PrefValue::Int(5)),
            ("big", PrefValue::Long(i64::from(i32::MAX) + 1)),
        ]);

        assert_eq!(prefs.get_long("small", 0).unwrap(), 5);
        assert!(prefs.get_int("big", 0).is_err());
    }

    #[test]
    fn test_get_all_reads_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let prefs = Preferences::new(backend.clone());
        assert!(prefs.get_all().unwrap().is_empty());

        backend.set_string("direct", "write").unwrap();

        let all = prefs.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["direct"], PrefValue::from("write"));
    }

    #[test]
    fn test_name() {
        assert_eq!(prefs().name(), DEFAULT_STORE);
        assert_eq!(seeded(&[]).name(), "seeded");
    }
}
