//! Change listeners
//!
//! Listeners are held by `Weak` reference only: registering never keeps a
//! listener alive. Entries whose listener has been dropped are pruned the
//! next time the registry is walked (a notification pass, or a
//! register/unregister call).
//!
//! The entry list is copy-on-write. Each mutation swaps in a new
//! `Arc<Vec<_>>`, so a notification pass iterates a stable snapshot and a
//! listener may register or unregister listeners from inside its callback.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::preferences::Preferences;

/// Receives a callback for every key changed by a commit
///
/// No value is passed; read it back from `prefs` if needed.
pub trait PreferenceChangeListener: Send + Sync {
    fn on_preference_changed(&self, prefs: &Preferences, key: &str);
}

impl<F> PreferenceChangeListener for F
where
    F: Fn(&Preferences, &str) + Send + Sync,
{
    fn on_preference_changed(&self, prefs: &Preferences, key: &str) {
        self(prefs, key)
    }
}

type Entry = Weak<dyn PreferenceChangeListener>;

/// Weakly-referenced set of listeners for one `Preferences`
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Arc<Vec<Entry>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a weak entry for `listener`
    ///
    /// Registering the same listener twice adds two entries; both fire.
    pub fn register<L>(&self, listener: &Arc<L>)
    where
        L: PreferenceChangeListener + 'static,
    {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Entry = weak;
        let mut entries = self.lock();
        let mut next: Vec<Entry> = live_entries(&entries);
        next.push(weak);
        *entries = Arc::new(next);
    }

    /// Remove one entry whose live target is `listener`
    ///
    /// No-op if the listener was never registered or is already gone.
    pub fn unregister<L>(&self, listener: &Arc<L>)
    where
        L: PreferenceChangeListener + 'static,
    {
        let target = Arc::as_ptr(listener) as *const ();
        let mut entries = self.lock();
        let mut next = live_entries(&entries);
        if let Some(pos) = next.iter().position(|entry| entry_ptr(entry) == target) {
            next.remove(pos);
        }
        *entries = Arc::new(next);
    }

    /// Call every live listener for `key`, pruning dead entries
    pub fn notify(&self, prefs: &Preferences, key: &str) {
        let snapshot = Arc::clone(&self.lock());

        let mut saw_dead = false;
        for entry in snapshot.iter() {
            match entry.upgrade() {
                Some(listener) => listener.on_preference_changed(prefs, key),
                None => saw_dead = true,
            }
        }

        if saw_dead {
            let mut entries = self.lock();
            *entries = Arc::new(live_entries(&entries));
        }
    }

    /// Number of entries, including any not yet pruned
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Arc<Vec<Entry>>> {
        // The guarded value is only ever replaced whole, so a poisoned
        // lock still holds a consistent snapshot.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

fn live_entries(entries: &[Entry]) -> Vec<Entry> {
    entries
        .iter()
        .filter(|entry| entry.strong_count() > 0)
        .cloned()
        .collect()
}

fn entry_ptr(entry: &Entry) -> *const () {
    entry.as_ptr() as *const ()
}
