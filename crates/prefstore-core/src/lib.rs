//! prefstore core library
//!
//! Typed, persistent key-value preferences with pluggable backends and
//! change notifications.
//!
//! # Architecture
//!
//! - **Backend**: native storage with get/set/remove/enumerate by key
//! - **Preferences**: typed reads with default fallback, listener registry
//! - **Editor**: batched writes, committed per key with interleaved
//!   notifications
//!
//! # Quick Start
//!
//! ```text
//! let stores = Stores::load()?;
//! let prefs = stores.open(Some("ui"))?;
//!
//! prefs.edit()
//!     .put_string("theme", "dark")
//!     .put_int("font_size", 14)
//!     .commit();
//!
//! let theme = prefs.get_string("theme", "light")?;
//! ```
//!
//! # Modules
//!
//! - `store`: one `Preferences` per store name (main entry point)
//! - `preferences`: the typed read facade
//! - `editor`: staged writes and commit
//! - `listener`: weakly-held change listeners
//! - `backend`: storage adapters (memory, JSON file, SQLite)
//! - `value`: the preference value union
//! - `config`: application configuration

pub mod backend;
pub mod config;
pub mod editor;
pub mod error;
pub mod listener;
pub mod preferences;
pub mod store;
pub mod value;

pub use backend::{Backend, BackendKind, JsonFileBackend, MemoryBackend, SqliteBackend};
pub use config::Config;
pub use editor::Editor;
pub use error::{PrefsError, StorageError, StorageResult};
pub use listener::{ListenerRegistry, PreferenceChangeListener};
pub use preferences::{Preferences, DEFAULT_STORE};
pub use store::Stores;
pub use value::{FromPrefValue, PrefValue, ValueKind};
