//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod recover;
pub mod verify;

use aolog_core::{HeaderSnapshot, LogConfig};
use aolog_storage::{MmapPagedStorage, StorageOptions};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Errors reported by the CLI itself.
#[derive(Debug, Error)]
pub enum CliError {
    /// No `--path` was given.
    #[error("log path required for {0}")]
    PathRequired(&'static str),

    /// The path does not exist.
    #[error("no log file at {0}")]
    NotFound(String),

    /// An unsupported `--format` value.
    #[error("unknown output format '{0}' (expected text or json)")]
    UnknownFormat(String),

    /// The file is shorter than one page.
    #[error("{path} holds {size} bytes, less than one page of {page_size}")]
    Truncated {
        /// File path.
        path: String,
        /// File size in bytes.
        size: u64,
        /// Page size in use.
        page_size: u32,
    },

    /// Verification found problems.
    #[error("verification failed with {0} problem(s)")]
    VerificationFailed(usize),
}

/// Output format for commands that support JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}

/// Reads the header of the log at `path` without modifying the file.
pub fn read_header(path: &Path) -> Result<HeaderSnapshot, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(CliError::NotFound(path.display().to_string()).into());
    }
    Ok(HeaderSnapshot::read_from(path)?)
}

/// Picks the page size: the explicit one if given, otherwise the one the
/// file was created with.
pub fn resolve_page_size(
    header: &HeaderSnapshot,
    explicit: Option<u32>,
) -> Result<u32, Box<dyn std::error::Error>> {
    let page_size = explicit.unwrap_or(header.page_size);
    LogConfig::default().page_size(page_size).validate()?;
    debug!(page_size, explicit = explicit.is_some(), "resolved page size");
    Ok(page_size)
}

/// Maps an existing, format-compatible log file read-only. The file is
/// never created, grown or written.
pub fn open_read_only_storage(
    path: &Path,
    explicit_page_size: Option<u32>,
) -> Result<(HeaderSnapshot, MmapPagedStorage), Box<dyn std::error::Error>> {
    let header = read_header(path)?;
    let page_size = resolve_page_size(&header, explicit_page_size)?;
    header.check_compatible(Some(path), page_size)?;

    let size = fs::metadata(path)?.len();
    if size < u64::from(page_size) {
        return Err(CliError::Truncated {
            path: path.display().to_string(),
            size,
            page_size,
        }
        .into());
    }

    let options = StorageOptions::default()
        .create_if_missing(false)
        .create_dirs(false)
        .read_only(true);
    let storage = MmapPagedStorage::open_with_options(path, page_size, options)?;
    Ok((header, storage))
}

/// Formats a byte count for humans.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{}", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
