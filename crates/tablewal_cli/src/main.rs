//! tablewal CLI
//!
//! Offline tools for looking at WAL segments, either in a local cache
//! directory or in a directory-backed object store.
//!
//! # Commands
//!
//! - `inspect` - Per-segment statistics
//! - `dump` - Print entries in replay order
//! - `verify` - Strict replay with id checks

mod commands;

use clap::{Parser, Subcommand};
use commands::source::Source;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// tablewal segment tools.
#[derive(Parser)]
#[command(name = "tablewal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Local cache directory to read segments from
    #[arg(global = true, long, conflicts_with = "remote_dir")]
    cache_dir: Option<PathBuf>,

    /// Directory object store to read segments from
    #[arg(global = true, long)]
    remote_dir: Option<PathBuf>,

    /// Key prefix of segments in the object store
    #[arg(global = true, long, default_value = "")]
    prefix: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show per-segment statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print entries in replay order
    Dump {
        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only print entries for this table
        #[arg(short, long)]
        table: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replay every segment strictly and check entry ids
    Verify {
        /// Accept a torn final entry in the last segment
        #[arg(long)]
        allow_torn_tail: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("tablewal CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("tablewal core v{}", tablewal_core::VERSION);
        return Ok(());
    }

    let source = Source::open(cli.cache_dir, cli.remote_dir, cli.prefix)?;
    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&source, &format)?,
        Commands::Dump {
            limit,
            table,
            format,
        } => commands::dump::run(&source, limit, table.as_deref(), &format)?,
        Commands::Verify { allow_torn_tail } => commands::verify::run(&source, allow_torn_tail)?,
        Commands::Version => {}
    }

    Ok(())
}
