//! Inspect command implementation.

use super::{format_size, read_header, resolve_page_size, OutputFormat};
use aolog_core::{HeaderSnapshot, USER_FIELDS};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Log header inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log file path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Magic tag as hex.
    pub magic: String,
    /// Magic tag as text.
    pub magic_ascii: String,
    /// On-disk format version.
    pub implementation_version: u32,
    /// Caller-defined data version.
    pub data_version: u32,
    /// Page size stored in the header.
    pub page_size: u32,
    /// First offset not yet allocated.
    pub allocated_up_to: u64,
    /// First offset not yet committed.
    pub committed_up_to: u64,
    /// Committed data records count.
    pub records_count: u32,
    /// "closed" or "opened".
    pub status: &'static str,
    /// Whether the next open runs recovery.
    pub needs_recovery: bool,
    /// Whether magic, version and page size match this build.
    pub compatible: bool,
    /// Why the file is incompatible, if it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incompatibility: Option<String>,
    /// Caller-defined header fields.
    pub user_fields: [u32; USER_FIELDS],
}

impl InspectResult {
    fn new(path: &Path, file_size: u64, header: &HeaderSnapshot, page_size: u32) -> Self {
        let incompatibility = header
            .check_compatible(Some(path), page_size)
            .err()
            .map(|e| e.to_string());
        Self {
            path: path.display().to_string(),
            file_size,
            magic: format!("{:#010x}", header.magic),
            magic_ascii: header.magic_ascii(),
            implementation_version: header.implementation_version,
            data_version: header.data_version,
            page_size: header.page_size,
            allocated_up_to: header.allocated_up_to,
            committed_up_to: header.committed_up_to,
            records_count: header.records_count,
            status: if header.is_closed() { "closed" } else { "opened" },
            needs_recovery: header.needs_recovery(),
            compatible: incompatibility.is_none(),
            incompatibility,
            user_fields: header.user_fields,
        }
    }
}

/// Runs the inspect command.
///
/// Reads the header with plain file I/O; the file is never mapped.
pub fn run(
    path: &Path,
    page_size: Option<u32>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let header = read_header(path)?;
    let page_size = resolve_page_size(&header, page_size)?;
    let file_size = fs::metadata(path)?.len();
    let result = InspectResult::new(path, file_size, &header, page_size);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("aolog File Inspection");
    println!("=====================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {} bytes", format_size(result.file_size));
    println!();
    println!("Format:");
    println!("  Magic:          {} ('{}')", result.magic, result.magic_ascii);
    println!("  Implementation: v{}", result.implementation_version);
    println!("  Data version:   {}", result.data_version);
    println!("  Page size:      {}", result.page_size);
    if let Some(reason) = &result.incompatibility {
        println!("  Incompatible:   {reason}");
    }
    println!();
    println!("State:");
    println!("  Allocated up to: {}", result.allocated_up_to);
    println!("  Committed up to: {}", result.committed_up_to);
    println!("  Records:         {}", result.records_count);
    println!("  Status:          {}", result.status);
    if result.needs_recovery {
        println!("  Next open runs recovery");
    }
    println!();
    println!("User fields: {:?}", result.user_fields);
}
