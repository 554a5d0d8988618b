//! crux command line interface.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crux::constants::CONFIG_FILE;

#[derive(Parser)]
#[command(name = "crux")]
#[command(version, about = "Inspect and edit crux persistent storage")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Override the key prefix from the configuration
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Print the value stored under a key
    Get {
        key: String,
        /// Print compact JSON
        #[arg(long)]
        compact: bool,
    },
    /// Store a value (parsed as JSON, otherwise stored as a string)
    Set {
        key: String,
        value: String,
        /// Expire the entry after this many milliseconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Remove a key
    Rm { key: String },
    /// List keys in the namespace
    Keys,
    /// Remove every key in the namespace
    Clear,
    /// Remove expired entries in the namespace
    Purge,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let ctx = commands::Context::load(&cli.config, cli.prefix)?;
    commands::storage::execute(&ctx, cli.command)
}

/// Initialize stderr logging, filtered by `RUST_LOG`.
fn init_logging(json: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("crux=info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
