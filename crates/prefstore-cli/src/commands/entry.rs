//! Entry command handlers (get, set, rm, list, clear, import)

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use tracing::debug;

use prefstore_core::{Editor, PrefValue, PreferenceChangeListener, Preferences, ValueKind};

use crate::output::Output;

/// Collects the keys a commit reports as changed
#[derive(Default)]
struct ChangeReporter {
    changed: Mutex<Vec<String>>,
}

impl PreferenceChangeListener for ChangeReporter {
    fn on_preference_changed(&self, prefs: &Preferences, key: &str) {
        debug!(store = prefs.name(), key, "preference changed");
        if let Ok(mut changed) = self.changed.lock() {
            changed.push(key.to_string());
        }
    }
}

impl ChangeReporter {
    fn take(&self) -> Vec<String> {
        self.changed
            .lock()
            .map(|mut changed| std::mem::take(&mut *changed))
            .unwrap_or_default()
    }
}

/// Stage edits with `stage`, commit them, and report which keys changed
fn commit_with_report<F>(prefs: &Preferences, output: &Output, stage: F) -> Result<()>
where
    F: FnOnce(&mut Editor<'_>) -> Result<()>,
{
    let reporter = Arc::new(ChangeReporter::default());
    prefs.register_listener(&reporter);

    let mut editor = prefs.edit();
    let result = stage(&mut editor).and_then(|()| {
        editor
            .try_commit()
            .with_context(|| format!("Failed to commit changes to store '{}'", prefs.name()))
    });

    prefs.unregister_listener(&reporter);
    result?;

    output.print_changed(&reporter.take());
    Ok(())
}

/// Show one value
pub fn get(
    prefs: &Preferences,
    key: String,
    kind: Option<ValueKind>,
    default: Option<String>,
    output: &Output,
) -> Result<()> {
    let value = match (kind, default) {
        (None, None) => prefs.get_value(&key)?,
        (None, Some(default)) => Some(
            prefs
                .get_value(&key)?
                .unwrap_or(PrefValue::String(default)),
        ),
        (Some(kind), Some(default)) => {
            let default = parse_value(kind, &default).context("Invalid --default")?;
            Some(read_typed(prefs, &key, default)?)
        }
        (Some(kind), None) => {
            if prefs.contains(&key)? {
                Some(read_typed(prefs, &key, zero_value(kind))?)
            } else {
                None
            }
        }
    };

    match value {
        Some(value) => {
            output.print_value(&key, &value);
            Ok(())
        }
        None => bail!("Key '{}' not found in store '{}'", key, prefs.name()),
    }
}

/// Write one value
pub fn set(
    prefs: &Preferences,
    key: String,
    raw: String,
    kind: ValueKind,
    output: &Output,
) -> Result<()> {
    let value = parse_value(kind, &raw)?;
    commit_with_report(prefs, output, |editor| {
        editor.put(&key, value);
        Ok(())
    })
}

/// Remove keys
pub fn remove(prefs: &Preferences, keys: Vec<String>, output: &Output) -> Result<()> {
    commit_with_report(prefs, output, |editor| {
        for key in &keys {
            editor.remove(key);
        }
        Ok(())
    })
}

/// List every entry
pub fn list(prefs: &Preferences, output: &Output) -> Result<()> {
    let entries = prefs
        .get_all()
        .with_context(|| format!("Failed to read store '{}'", prefs.name()))?;
    output.print_entries(prefs.name(), &entries);
    Ok(())
}

/// Remove every entry
pub fn clear(prefs: &Preferences, output: &Output) -> Result<()> {
    commit_with_report(prefs, output, |editor| {
        editor.clear();
        Ok(())
    })
}

/// Import entries from a JSON object (file path, or stdin for "-")
///
/// With `replace`, the store is cleared in the same commit.
pub fn import(prefs: &Preferences, source: PathBuf, replace: bool, output: &Output) -> Result<()> {
    let content = if source.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
    } else {
        std::fs::read_to_string(&source)
            .with_context(|| format!("Failed to read {:?}", source))?
    };

    let entries: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&content).context("Import must be a JSON object of key/value pairs")?;

    commit_with_report(prefs, output, |editor| {
        if replace {
            editor.clear();
        }
        for (key, value) in entries {
            editor.put_value(&key, value)?;
        }
        Ok(())
    })
}

/// Parse a command-line string as a value of `kind`
///
/// String sets are comma-separated; an empty string is the empty set.
pub fn parse_value(kind: ValueKind, raw: &str) -> Result<PrefValue> {
    let value = match kind {
        ValueKind::String => PrefValue::String(raw.to_string()),
        ValueKind::Int => PrefValue::Int(
            raw.trim()
                .parse()
                .with_context(|| format!("'{}' is not a valid int", raw))?,
        ),
        ValueKind::Long => PrefValue::Long(
            raw.trim()
                .parse()
                .with_context(|| format!("'{}' is not a valid long", raw))?,
        ),
        ValueKind::Float => PrefValue::Float(
            raw.trim()
                .parse()
                .with_context(|| format!("'{}' is not a valid float", raw))?,
        ),
        ValueKind::Boolean => PrefValue::Boolean(parse_bool(raw)?),
        ValueKind::StringSet => PrefValue::StringSet(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<String>>(),
        ),
    };
    Ok(value)
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => bail!("'{}' is not a valid boolean. Use 'true' or 'false'.", raw),
    }
}

fn zero_value(kind: ValueKind) -> PrefValue {
    match kind {
        ValueKind::String => PrefValue::String(String::new()),
        ValueKind::Int => PrefValue::Int(0),
        ValueKind::Long => PrefValue::Long(0),
        ValueKind::Float => PrefValue::Float(0.0),
        ValueKind::Boolean => PrefValue::Boolean(false),
        ValueKind::StringSet => PrefValue::StringSet(BTreeSet::new()),
    }
}

/// Typed read, so a shape mismatch surfaces as an error
fn read_typed(prefs: &Preferences, key: &str, default: PrefValue) -> Result<PrefValue> {
    let value = match default {
        PrefValue::String(d) => PrefValue::String(prefs.get_string(key, &d)?),
        PrefValue::Int(d) => PrefValue::Int(prefs.get_int(key, d)?),
        PrefValue::Long(d) => PrefValue::Long(prefs.get_long(key, d)?),
        PrefValue::Float(d) => PrefValue::Float(prefs.get_float(key, d)?),
        PrefValue::Boolean(d) => PrefValue::Boolean(prefs.get_boolean(key, d)?),
        PrefValue::StringSet(d) => PrefValue::StringSet(prefs.get_string_set(key, d)?),
    };
    Ok(value)
}
