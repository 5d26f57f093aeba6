//! Named stores
//!
//! `Stores` hands out one `Preferences` per store name and keeps it for the
//! lifetime of the manager, so every caller asking for the same name shares
//! the same backend and the same listener registry.
//!
//! ## Usage
//!
//! ```ignore
//! let stores = Stores::load()?;          // config from default location
//! let prefs = stores.open(Some("ui"))?;   // named store
//! let defaults = stores.open(None)?;      // config.default_store
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::backend::{Backend, BackendKind, JsonFileBackend, MemoryBackend, SqliteBackend};
use crate::config::Config;
use crate::preferences::Preferences;

/// Cache of open stores, one per name
pub struct Stores {
    config: Config,
    open: Mutex<HashMap<String, Arc<Preferences>>>,
}

impl Stores {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Ok(Self::new(config))
    }

    pub fn new(config: Config) -> Self {
        Self {
            config,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the store called `name`, or the default store for `None`
    ///
    /// The backend is created on first request and reused afterwards.
    pub fn open(&self, name: Option<&str>) -> Result<Arc<Preferences>> {
        let name = name.unwrap_or(self.config.default_store.as_str());
        validate_store_name(name)?;

        let mut open = self
            .open
            .lock()
            .map_err(|_| anyhow::anyhow!("Store cache lock poisoned"))?;
        if let Some(prefs) = open.get(name) {
            return Ok(Arc::clone(prefs));
        }

        let backend = self
            .create_backend(name)
            .with_context(|| format!("Failed to open store '{}'", name))?;
        info!(store = name, backend = self.config.backend.as_str(), "opened store");

        let prefs = Arc::new(Preferences::with_name(name, backend));
        open.insert(name.to_string(), Arc::clone(&prefs));
        Ok(prefs)
    }

    fn create_backend(&self, name: &str) -> Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match self.config.backend {
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
            BackendKind::Json => {
                self.config.ensure_data_dir()?;
                Arc::new(JsonFileBackend::open(self.config.store_file_path(name))?)
            }
            BackendKind::Sqlite => {
                self.config.ensure_data_dir()?;
                Arc::new(SqliteBackend::open(&self.config.sqlite_path(), name)?)
            }
        };
        Ok(backend)
    }
}

/// Store names double as file names for the JSON backend
fn validate_store_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Store name cannot be empty");
    }
    if name.starts_with('.')
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        bail!(
            "Invalid store name '{}': use letters, digits, '-', '_' or '.', not starting with '.'",
            name
        );
    }
    Ok(())
}
