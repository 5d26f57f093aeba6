//! prefstore CLI
//!
//! Command-line interface for reading and editing preference stores.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use prefstore_core::{Config, PrefsError, StorageError, Stores, ValueKind};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "prefs")]
#[command(about = "prefstore - typed key-value preferences")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Store to operate on (defaults to config.default_store)
    #[arg(short, long, global = true)]
    store: Option<String>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a value
    Get {
        key: String,
        /// Read as this type (fails if the stored value doesn't convert)
        #[arg(short = 't', long = "type", value_enum)]
        value_type: Option<ValueType>,
        /// Value to show when the key is missing
        #[arg(short, long)]
        default: Option<String>,
    },
    /// Write a value
    Set {
        key: String,
        /// Value (string sets are comma-separated)
        value: String,
        #[arg(short = 't', long = "type", value_enum, default_value = "string")]
        value_type: ValueType,
    },
    /// Remove keys
    #[command(alias = "remove")]
    Rm {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List every entry in the store
    #[command(alias = "ls")]
    List,
    /// Remove every entry in the store
    Clear,
    /// Import entries from a JSON object ("-" reads stdin)
    Import {
        source: PathBuf,
        /// Clear the store in the same commit
        #[arg(long)]
        replace: bool,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, backend, default_store, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ValueType {
    String,
    Int,
    Long,
    Float,
    #[value(alias = "bool")]
    Boolean,
    #[value(name = "set")]
    StringSet,
}

impl From<ValueType> for ValueKind {
    fn from(value: ValueType) -> Self {
        match value {
            ValueType::String => ValueKind::String,
            ValueType::Int => ValueKind::Int,
            ValueType::Long => ValueKind::Long,
            ValueType::Float => ValueKind::Float,
            ValueType::Boolean => ValueKind::Boolean,
            ValueType::StringSet => ValueKind::StringSet,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    match run(cli, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e, &output);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, output: &Output) -> Result<()> {
    // Config commands don't open a store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    let stores = Stores::new(config);
    let prefs = stores.open(cli.store.as_deref())?;

    match cli.command {
        Commands::Get {
            key,
            value_type,
            default,
        } => commands::entry::get(&prefs, key, value_type.map(Into::into), default, output),
        Commands::Set {
            key,
            value,
            value_type,
        } => commands::entry::set(&prefs, key, value, value_type.into(), output),
        Commands::Rm { keys } => commands::entry::remove(&prefs, keys, output),
        Commands::List => commands::entry::list(&prefs, output),
        Commands::Clear => commands::entry::clear(&prefs, output),
        Commands::Import { source, replace } => {
            commands::entry::import(&prefs, source, replace, output)
        }
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

/// Print a failed command's error, plus a recovery hint for storage failures
fn report_error(err: &anyhow::Error, output: &Output) {
    let hint = storage_error(err).and_then(StorageError::recovery_suggestion);

    if output.is_json() {
        println!(
            "{}",
            serde_json::json!({
                "status": "error",
                "message": format!("{:#}", err),
                "hint": hint
            })
        );
        return;
    }

    eprintln!("Error: {:?}", err);
    if let Some(hint) = hint.filter(|_| !output.is_quiet()) {
        eprintln!();
        eprintln!("Hint: {}", hint);
    }
}

/// First storage failure in the error chain, if any
fn storage_error(err: &anyhow::Error) -> Option<&StorageError> {
    err.chain().find_map(|cause| {
        if let Some(storage) = cause.downcast_ref::<StorageError>() {
            return Some(storage);
        }
        match cause.downcast_ref::<PrefsError>() {
            Some(PrefsError::Storage(storage)) => Some(storage),
            _ => None,
        }
    })
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Initialize logging
///
/// Only initializes if PREFSTORE_LOG environment variable is set.
/// Logs to config.log_file when set, stderr otherwise.
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("PREFSTORE_LOG") else {
        return;
    };

    let env_filter = EnvFilter::new(format!(
        "prefstore_core={},prefstore_cli={}",
        log_level, log_level
    ));

    match &config.log_file {
        Some(log_path) => {
            let log_file = match File::create(log_path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                    return;
                }
            };

            // Ignore error if already initialized
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file)
                .try_init();

            info!("Logging initialized to {:?}", log_path);
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
}
