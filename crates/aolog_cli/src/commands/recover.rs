//! Recover command implementation.

use super::{read_header, resolve_page_size, OutputFormat};
use aolog_core::{AppendOnlyLog, LogConfig};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Outcome of opening a log for recovery.
#[derive(Debug, Serialize)]
pub struct RecoverResult {
    /// Log file path.
    pub path: String,
    /// Whether recovery ran.
    pub was_recovery_needed: bool,
    /// Whether the previous session closed the log.
    pub was_closed_properly: bool,
    /// `[start, end)` of the recovered region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_region: Option<(u64, u64)>,
    /// Committed data records after recovery.
    pub records_count: u32,
}

/// Opens the log (running recovery if needed) and closes it properly.
pub fn recover(path: &Path, page_size: Option<u32>) -> Result<RecoverResult, Box<dyn std::error::Error>> {
    let header = read_header(path)?;
    let page_size = resolve_page_size(&header, page_size)?;
    let config = LogConfig::default()
        .page_size(page_size)
        .create_if_missing(false)
        .create_dirs(false)
        .fsync_on_flush(true);

    let log = AppendOnlyLog::open_with_config(path, config)?;
    let result = RecoverResult {
        path: path.display().to_string(),
        was_recovery_needed: log.was_recovery_needed(),
        was_closed_properly: log.was_closed_properly(),
        recovered_region: log.recovered_region(),
        records_count: log.records_count()?,
    };
    log.close()?;
    info!(
        path = %result.path,
        recovered = result.was_recovery_needed,
        records = result.records_count,
        "log closed after recovery check"
    );
    Ok(result)
}

/// Runs the recover command.
pub fn run(
    path: &Path,
    page_size: Option<u32>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = recover(path, page_size)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!("Recovered log at {:?}", path);
            println!();
            println!("  Closed properly:  {}", result.was_closed_properly);
            println!("  Recovery needed:  {}", result.was_recovery_needed);
            if let Some((start, end)) = result.recovered_region {
                println!("  Recovered region: [{start}..{end})");
            }
            println!("  Records:          {}", result.records_count);
        }
    }
    Ok(())
}
