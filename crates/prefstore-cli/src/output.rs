//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use std::collections::BTreeMap;

use prefstore_core::PrefValue;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Check if output is JSON
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single value
    pub fn print_value(&self, key: &str, value: &PrefValue) {
        match self.format {
            OutputFormat::Human => {
                println!("{} ({}) = {}", key, value.kind(), value);
            }
            OutputFormat::Json => {
                println!("{}", entry_json(key, value));
            }
            OutputFormat::Quiet => {
                println!("{}", value);
            }
        }
    }

    /// Print every entry of a store
    pub fn print_entries(&self, store: &str, entries: &BTreeMap<String, PrefValue>) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("Store '{}' is empty.", store);
                    return;
                }

                let width = entries.keys().map(|k| k.len()).max().unwrap_or(0);
                for (key, value) in entries {
                    println!(
                        "{:<width$}  {:<10}  {}",
                        key,
                        value.kind().to_string(),
                        value,
                        width = width
                    );
                }
                println!();
                println!("{} entr{} in '{}'", entries.len(), plural_y(entries.len()), store);
            }
            OutputFormat::Json => {
                let items: Vec<serde_json::Value> = entries
                    .iter()
                    .map(|(key, value)| entry_json(key, value))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Quiet => {
                for key in entries.keys() {
                    println!("{}", key);
                }
            }
        }
    }

    /// Report the keys a commit touched
    pub fn print_changed(&self, changed: &[String]) {
        match self.format {
            OutputFormat::Human => {
                if changed.is_empty() {
                    println!("No changes.");
                }
                for key in changed {
                    println!("✓ changed {}", key);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::json!({ "changed": changed }));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message (suppressed in quiet mode)
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({ "status": "ok", "message": message })
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn entry_json(key: &str, value: &PrefValue) -> serde_json::Value {
    serde_json::json!({
        "key": key,
        "type": value.kind().as_str(),
        "value": value.to_json(),
    })
}

fn plural_y(count: usize) -> &'static str {
    if count == 1 {
        "y"
    } else {
        "ies"
    }
}
