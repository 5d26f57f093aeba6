//! Editor: batched writes against one store
//!
//! An editor stages puts, removals and an optional clear, then applies them
//! in one `commit()`:
//!
//! 1. If `clear()` was staged, every key currently in the backend is
//!    removed. Listeners hear about each removed key that the batch does
//!    not write again.
//! 2. Each staged key is applied in staging order, and listeners are
//!    notified for that key right after it lands in the backend.
//!
//! Notifications are interleaved with writes, so a listener reading the
//! notified key sees the committed value even though later keys of the
//! same batch may not be applied yet.
//!
//! There is no cross-key isolation: each backend write is atomic on its
//! own, nothing more.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};

use crate::error::{PrefsError, Result};
use crate::preferences::Preferences;
use crate::value::PrefValue;

/// What a commit will do to one key
#[derive(Debug, Clone, PartialEq)]
enum PendingEdit {
    Put(PrefValue),
    Remove,
}

/// Uncommitted batch of changes for a `Preferences` store
///
/// Obtained from `Preferences::edit()`. Staging methods return the editor
/// for chaining. Staging the same key twice keeps only the last edit (at
/// the key's original position). After a successful commit the editor is
/// empty; committing again is a no-op that still succeeds.
#[must_use = "staged edits are discarded unless committed or applied"]
pub struct Editor<'a> {
    prefs: &'a Preferences,
    edits: Vec<(String, PendingEdit)>,
    clear: bool,
}

impl<'a> Editor<'a> {
    pub(crate) fn new(prefs: &'a Preferences) -> Self {
        Self {
            prefs,
            edits: Vec::new(),
            clear: false,
        }
    }

    /// Stage `value` under `key`
    pub fn put(&mut self, key: &str, value: impl Into<PrefValue>) -> &mut Self {
        self.stage(key, PendingEdit::Put(value.into()))
    }

    pub fn put_string(&mut self, key: &str, value: &str) -> &mut Self {
        self.put(key, value)
    }

    /// Stage a string, or a removal for `None`
    pub fn put_optional_string(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        match value {
            Some(value) => self.put(key, value),
            None => self.remove(key),
        }
    }

    pub fn put_int(&mut self, key: &str, value: i32) -> &mut Self {
        self.put(key, value)
    }

    pub fn put_long(&mut self, key: &str, value: i64) -> &mut Self {
        self.put(key, value)
    }

    pub fn put_float(&mut self, key: &str, value: f32) -> &mut Self {
        self.put(key, value)
    }

    pub fn put_boolean(&mut self, key: &str, value: bool) -> &mut Self {
        self.put(key, value)
    }

    pub fn put_string_set<I, S>(&mut self, key: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        self.put(key, set)
    }

    /// Stage a string set, or a removal for `None`
    pub fn put_optional_string_set(
        &mut self,
        key: &str,
        values: Option<BTreeSet<String>>,
    ) -> &mut Self {
        match values {
            Some(set) => self.put(key, set),
            None => self.remove(key),
        }
    }

    /// Stage a dynamically-typed value
    ///
    /// `null` stages a removal. Values with no preference shape (objects,
    /// arrays holding non-strings) are rejected here rather than at commit.
    pub fn put_value(&mut self, key: &str, value: serde_json::Value) -> Result<&mut Self> {
        match PrefValue::from_json(value) {
            Ok(Some(value)) => Ok(self.put(key, value)),
            Ok(None) => Ok(self.remove(key)),
            Err(details) => Err(PrefsError::UnsupportedValue {
                key: key.to_string(),
                details,
            }),
        }
    }

    /// Stage removal of `key`
    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.stage(key, PendingEdit::Remove)
    }

    /// Remove every existing key before applying the staged edits
    pub fn clear(&mut self) -> &mut Self {
        self.clear = true;
        self
    }

    /// Whether anything is staged
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && !self.clear
    }

    /// Apply the staged batch, reporting backend failures
    ///
    /// On failure the staged edits are kept, so the batch can be retried;
    /// keys already written stay written.
    pub fn try_commit(&mut self) -> Result<()> {
        let backend = self.prefs.backend();
        debug!(
            store = self.prefs.name(),
            edits = self.edits.len(),
            clear = self.clear,
            "committing"
        );

        let edited: HashSet<&str> = self.edits.iter().map(|(key, _)| key.as_str()).collect();

        if self.clear {
            let existing = backend.get_all()?;
            for key in existing.keys() {
                backend.remove_key(key)?;
            }
            for key in existing.keys().filter(|key| !edited.contains(key.as_str())) {
                self.prefs.notify(key);
            }
            self.clear = false;
        }

        for (key, edit) in &self.edits {
            match edit {
                PendingEdit::Remove => backend.remove_key(key)?,
                PendingEdit::Put(PrefValue::String(s)) => backend.set_string(key, s)?,
                PendingEdit::Put(PrefValue::Int(i)) => backend.set_int(key, *i)?,
                PendingEdit::Put(PrefValue::Long(l)) => backend.set_long(key, *l)?,
                PendingEdit::Put(PrefValue::Float(f)) => backend.set_float(key, *f)?,
                PendingEdit::Put(PrefValue::Boolean(b)) => backend.set_boolean(key, *b)?,
                PendingEdit::Put(PrefValue::StringSet(set)) => backend.set_string_set(key, set)?,
            }
            self.prefs.notify(key);
        }

        self.edits.clear();
        Ok(())
    }

    /// Apply the staged batch; `false` if the backend failed
    pub fn commit(&mut self) -> bool {
        match self.try_commit() {
            Ok(()) => true,
            Err(e) => {
                warn!(store = self.prefs.name(), error = %e, "commit failed");
                false
            }
        }
    }

    /// Apply the staged batch, ignoring failure
    ///
    /// Use `commit()` or `try_commit()` when the outcome matters.
    pub fn apply(&mut self) {
        let _ = self.commit();
    }

    fn stage(&mut self, key: &str, edit: PendingEdit) -> &mut Self {
        match self.edits.iter_mut().find(|(staged, _)| staged == key) {
            Some((_, slot)) => *slot = edit,
            None => self.edits.push((key.to_string(), edit)),
        }
        self
    }
}

impl std::fmt::Debug for Editor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("store", &self.prefs.name())
            .field("edits", &self.edits)
            .field("clear", &self.clear)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, JsonFileBackend, MemoryBackend, SqliteBackend};
    use crate::error::{StorageError, StorageResult};
    use crate::listener::PreferenceChangeListener;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records every notified key, with what the backend held at that moment
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, Option<PrefValue>)>>,
    }

    impl PreferenceChangeListener for Recorder {
        fn on_preference_changed(&self, prefs: &Preferences, key: &str) {
            let value = prefs.get_value(key).unwrap();
            self.seen.lock().unwrap().push((key.to_string(), value));
        }
    }

    impl Recorder {
        fn keys(&self) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|(k, _)| k.clone())
                .collect()
        }
    }

    /// Run `check` against a fresh store on every adapter
    ///
    /// Each store starts with `seed` keys holding `true`. The store name
    /// is the adapter name, so failures say which one broke.
    fn each_backend(seed: &[&str], check: impl Fn(&Preferences)) {
        let temp_dir = TempDir::new().unwrap();
        let memory: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let json: Arc<dyn Backend> =
            Arc::new(JsonFileBackend::open(temp_dir.path().join("prefs.json")).unwrap());
        let sqlite: Arc<dyn Backend> = Arc::new(SqliteBackend::open_in_memory("test").unwrap());

        for (name, backend) in [("memory", memory), ("json", json), ("sqlite", sqlite)] {
            for key in seed {
                backend.set_boolean(key, true).unwrap();
            }
            check(&Preferences::with_name(name, backend));
        }
    }

    /// Backend whose writes fail once `fail_writes` is set
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        fail_writes: Mutex<bool>,
    }

    impl FlakyBackend {
        fn check(&self) -> StorageResult<()> {
            if *self.fail_writes.lock().unwrap() {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk went away",
                )));
            }
            Ok(())
        }
    }

    impl Backend for FlakyBackend {
        fn get_all(&self) -> StorageResult<BTreeMap<String, PrefValue>> {
            self.inner.get_all()
        }

        fn get(&self, key: &str) -> StorageResult<Option<PrefValue>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: PrefValue) -> StorageResult<()> {
            self.check()?;
            self.inner.set(key, value)
        }

        fn remove_key(&self, key: &str) -> StorageResult<()> {
            self.check()?;
            self.inner.remove_key(key)
        }
    }

    #[test]
    fn test_put_and_commit() {
        each_backend(&[], |prefs| {
            assert!(prefs.edit().put_int("a", 1).commit(), "{}", prefs.name());

            assert_eq!(prefs.get_int("a", 0).unwrap(), 1, "{}", prefs.name());
            assert!(prefs.contains("a").unwrap());
        });
    }

    #[test]
    fn test_round_trip_every_shape() {
        each_backend(&[], |prefs| {
            let empty: BTreeSet<String> = BTreeSet::new();

            assert!(prefs
                .edit()
                .put_string("s", "")
                .put_int("i", 0)
                .put_int("neg", -1)
                .put_long("l", i64::MIN)
                .put_float("f", -0.5)
                .put_boolean("b", false)
                .put_string_set("empty", Vec::<String>::new())
                .put_string_set("set", ["red", "blue"])
                .commit());

            let name = prefs.name();
            assert_eq!(prefs.get_string("s", "x").unwrap(), "", "{}", name);
            assert_eq!(prefs.get_int("i", 9).unwrap(), 0, "{}", name);
            assert_eq!(prefs.get_int("neg", 9).unwrap(), -1, "{}", name);
            assert_eq!(prefs.get_long("l", 9).unwrap(), i64::MIN, "{}", name);
            assert_eq!(prefs.get_float("f", 9.0).unwrap(), -0.5, "{}", name);
            assert!(!prefs.get_boolean("b", true).unwrap(), "{}", name);
            assert_eq!(
                prefs
                    .get_string_set("empty", ["x".to_string()].into_iter().collect())
                    .unwrap(),
                empty,
                "{}",
                name
            );
            assert_eq!(
                prefs.get_string_set("set", empty.clone()).unwrap(),
                ["blue".to_string(), "red".to_string()]
                    .into_iter()
                    .collect::<BTreeSet<String>>(),
                "{}",
                name
            );
        });
    }

    #[test]
    fn test_non_finite_float_round_trip() {
        each_backend(&[], |prefs| {
            assert!(prefs
                .edit()
                .put_string("keep", "me")
                .put_float("inf", f32::INFINITY)
                .put_float("nan", f32::NAN)
                .commit());

            let name = prefs.name();
            assert_eq!(prefs.get_float("inf", 0.0).unwrap(), f32::INFINITY, "{}", name);
            assert!(prefs.get_float("nan", 0.0).unwrap().is_nan(), "{}", name);
            assert_eq!(prefs.get_string("keep", "").unwrap(), "me", "{}", name);

            // A store holding them can still be enumerated and cleared
            assert_eq!(prefs.get_all().unwrap().len(), 3, "{}", name);
            assert!(prefs.edit().clear().commit(), "{}", name);
            assert!(prefs.get_all().unwrap().is_empty(), "{}", name);
        });
    }

    #[test]
    fn test_last_staged_edit_wins() {
        each_backend(&["a"], |prefs| {
            prefs.edit().remove("a").put_int("a", 5).commit();
            assert_eq!(prefs.get_int("a", 0).unwrap(), 5, "{}", prefs.name());

            prefs.edit().put_int("a", 6).remove("a").commit();
            assert!(!prefs.contains("a").unwrap(), "{}", prefs.name());
        });
    }

    #[test]
    fn test_restaging_keeps_first_position() {
        each_backend(&[], |prefs| {
            let recorder = Arc::new(Recorder::default());
            prefs.register_listener(&recorder);

            prefs
                .edit()
                .put_int("first", 1)
                .put_int("second", 2)
                .put_int("first", 3)
                .commit();

            assert_eq!(recorder.keys(), vec!["first", "second"], "{}", prefs.name());
            assert_eq!(prefs.get_int("first", 0).unwrap(), 3, "{}", prefs.name());
        });
    }

    #[test]
    fn test_clear_with_put() {
        each_backend(&["a", "b", "c"], |prefs| {
            let recorder = Arc::new(Recorder::default());
            prefs.register_listener(&recorder);

            prefs.edit().clear().put_int("a", 7).commit();

            let all = prefs.get_all().unwrap();
            assert_eq!(all.len(), 1, "{}", prefs.name());
            assert_eq!(all["a"], PrefValue::Int(7), "{}", prefs.name());

            // Removed keys first, then the re-written one
            assert_eq!(recorder.keys(), vec!["b", "c", "a"], "{}", prefs.name());
        });
    }

    #[test]
    fn test_clear_notifies_removed_keys_only_once() {
        each_backend(&["x"], |prefs| {
            let recorder = Arc::new(Recorder::default());
            prefs.register_listener(&recorder);

            prefs.edit().clear().commit();

            assert!(prefs.get_all().unwrap().is_empty(), "{}", prefs.name());
            assert_eq!(recorder.keys(), vec!["x"], "{}", prefs.name());
        });
    }

    #[test]
    fn test_clear_on_empty_store_is_silent() {
        each_backend(&[], |prefs| {
            let recorder = Arc::new(Recorder::default());
            prefs.register_listener(&recorder);

            assert!(prefs.edit().clear().commit(), "{}", prefs.name());
            assert!(recorder.keys().is_empty(), "{}", prefs.name());
        });
    }

    #[test]
    fn test_listener_sees_key_already_written() {
        each_backend(&["b"], |prefs| {
            let recorder = Arc::new(Recorder::default());
            prefs.register_listener(&recorder);

            prefs.edit().put_int("a", 1).remove("b").commit();

            let seen = recorder.seen.lock().unwrap().clone();
            assert_eq!(
                seen,
                vec![
                    ("a".to_string(), Some(PrefValue::Int(1))),
                    ("b".to_string(), None),
                ],
                "{}",
                prefs.name()
            );
        });
    }

    #[test]
    fn test_notification_is_interleaved() {
        each_backend(&[], |prefs| {
            let observed = Arc::new(Mutex::new(Vec::new()));

            // When "a" is notified, "b" must not be written yet
            let sink = Arc::clone(&observed);
            let listener = Arc::new(move |prefs: &Preferences, key: &str| {
                let b_present = prefs.contains("b").unwrap();
                sink.lock().unwrap().push((key.to_string(), b_present));
            });
            prefs.register_listener(&listener);

            prefs.edit().put_int("a", 1).put_int("b", 2).commit();

            assert_eq!(
                *observed.lock().unwrap(),
                vec![("a".to_string(), false), ("b".to_string(), true)],
                "{}",
                prefs.name()
            );
        });
    }

    #[test]
    fn test_unregistered_listener_hears_nothing() {
        each_backend(&[], |prefs| {
            let recorder = Arc::new(Recorder::default());

            prefs.register_listener(&recorder);
            prefs.unregister_listener(&recorder);
            prefs.edit().put_int("a", 1).commit();

            assert!(recorder.keys().is_empty(), "{}", prefs.name());
        });
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        each_backend(&[], |prefs| {
            let recorder = Arc::new(Recorder::default());
            prefs.register_listener(&recorder);
            drop(recorder);

            assert!(prefs.edit().put_int("a", 1).commit(), "{}", prefs.name());
            assert_eq!(prefs.listener_count(), 0, "{}", prefs.name());
        });
    }

    #[test]
    fn test_recommit_is_noop() {
        each_backend(&[], |prefs| {
            let recorder = Arc::new(Recorder::default());
            prefs.register_listener(&recorder);

            let mut editor = prefs.edit();
            editor.put_int("a", 1);
            assert!(editor.commit());
            assert!(editor.is_empty());

            assert!(editor.commit());
            editor.apply();
            assert_eq!(recorder.keys(), vec!["a"], "{}", prefs.name());
        });
    }

    #[test]
    fn test_apply_matches_commit() {
        each_backend(&["old"], |committed| {
            committed
                .edit()
                .clear()
                .put_string("s", "v")
                .put_long("l", 3)
                .commit();

            let applied = Preferences::new(Arc::new(MemoryBackend::new()));
            applied.edit().put_boolean("old", true).commit();
            applied
                .edit()
                .clear()
                .put_string("s", "v")
                .put_long("l", 3)
                .apply();

            assert_eq!(
                committed.get_all().unwrap(),
                applied.get_all().unwrap(),
                "{}",
                committed.name()
            );
        });
    }

    #[test]
    fn test_optional_none_removes() {
        each_backend(&["s", "set"], |prefs| {
            prefs
                .edit()
                .put_optional_string("s", None)
                .put_optional_string_set("set", None)
                .put_optional_string("kept", Some("yes"))
                .commit();

            assert!(!prefs.contains("s").unwrap(), "{}", prefs.name());
            assert!(!prefs.contains("set").unwrap(), "{}", prefs.name());
            assert_eq!(prefs.get_string("kept", "").unwrap(), "yes", "{}", prefs.name());
        });
    }

    #[test]
    fn test_put_value_rejects_unsupported_shape() {
        let prefs = Preferences::new(Arc::new(MemoryBackend::new()));
        let mut editor = prefs.edit();

        let err = editor
            .put_value("obj", serde_json::json!({"a": 1}))
            .unwrap_err();
        assert!(matches!(err, PrefsError::UnsupportedValue { .. }));

        // Nothing staged for the rejected key
        assert!(editor.is_empty());
    }

    #[test]
    fn test_put_value_stages_shapes() {
        each_backend(&["gone"], |prefs| {
            prefs
                .edit()
                .put_value("n", serde_json::json!(42))
                .unwrap()
                .put_value("gone", serde_json::Value::Null)
                .unwrap()
                .commit();

            assert_eq!(prefs.get_int("n", 0).unwrap(), 42, "{}", prefs.name());
            assert!(!prefs.contains("gone").unwrap(), "{}", prefs.name());
        });
    }

    #[test]
    fn test_backend_failure_reports_false_and_keeps_batch() {
        let backend = Arc::new(FlakyBackend::default());
        let prefs = Preferences::new(backend.clone());

        *backend.fail_writes.lock().unwrap() = true;
        let mut editor = prefs.edit();
        editor.put_int("a", 1);

        assert!(!editor.commit());
        assert!(matches!(editor.try_commit(), Err(PrefsError::Storage(_))));
        assert!(!editor.is_empty());

        // apply() swallows the failure
        editor.apply();

        *backend.fail_writes.lock().unwrap() = false;
        assert!(editor.commit());
        assert_eq!(prefs.get_int("a", 0).unwrap(), 1);
    }

    #[test]
    fn test_concurrent_editors_are_independent() {
        each_backend(&[], |prefs| {
            let mut first = prefs.edit();
            let mut second = prefs.edit();

            first.put_int("a", 1);
            second.put_int("b", 2);
            second.commit();
            first.commit();

            assert_eq!(prefs.get_all().unwrap().len(), 2, "{}", prefs.name());
        });
    }
}
