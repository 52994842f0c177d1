//! aolog CLI
//!
//! Command-line tools for append-only log files.
//!
//! # Commands
//!
//! - `inspect` - Display the log header
//! - `verify` - Check log structure without modifying it
//! - `dump` - Print records with hex payload previews
//! - `recover` - Open the log, running crash recovery if needed

mod commands;

use clap::{Parser, Subcommand};
use commands::dump::DumpOptions;
use commands::{CliError, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// aolog command-line log tools.
#[derive(Parser)]
#[command(name = "aolog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Page size (defaults to the one stored in the file)
    #[arg(global = true, long)]
    page_size: Option<u32>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the log header
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Verify log structure (read-only)
    Verify,

    /// Dump records for debugging (read-only)
    Dump {
        /// Start from this record id
        #[arg(long, default_value = "0")]
        from_id: u64,

        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Payload bytes shown per record
        #[arg(long, default_value = "32")]
        max_bytes: usize,

        /// Include padding and uncommitted records
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Open the log, recovering unfinished appends, and close it
    Recover {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or(CliError::PathRequired("inspect"))?;
            commands::inspect::run(&path, cli.page_size, format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or(CliError::PathRequired("verify"))?;
            commands::verify::run(&path, cli.page_size)?;
        }
        Commands::Dump {
            from_id,
            limit,
            max_bytes,
            all,
            format,
        } => {
            let path = cli.path.ok_or(CliError::PathRequired("dump"))?;
            let options = DumpOptions {
                from_id,
                limit,
                max_bytes,
                all,
            };
            commands::dump::run(&path, cli.page_size, options, format)?;
        }
        Commands::Recover { format } => {
            let path = cli.path.ok_or(CliError::PathRequired("recover"))?;
            commands::recover::run(&path, cli.page_size, format)?;
        }
        Commands::Version => {
            println!("aolog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("aolog core v{}", aolog_core::VERSION);
            println!(
                "on-disk format v{}",
                aolog_core::IMPLEMENTATION_VERSION
            );
        }
    }

    Ok(())
}
