//! Dump command implementation.

use super::{open_read_only_storage, OutputFormat};
use aolog_core::{to_hex, RecordScanner, RecordState, ScannedRecord};
use aolog_storage::PagedStorage;
use serde::Serialize;
use std::path::Path;

/// A record for output.
#[derive(Debug, Serialize)]
pub struct DumpRecord {
    /// Record id.
    pub id: u64,
    /// File offset of the record header.
    pub offset: u64,
    /// Record state (data, padding, uncommitted).
    pub state: &'static str,
    /// Stored length, header included.
    pub length: u32,
    /// Payload length.
    pub payload_len: usize,
    /// Leading payload bytes as hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    /// Whether `hex` is cut short.
    pub truncated: bool,
}

impl DumpRecord {
    fn from_scanned(record: &ScannedRecord) -> Self {
        let payload_len = record.state.payload_length();
        let is_data = matches!(record.state, RecordState::CommittedData { .. });
        Self {
            id: record.id.as_u64(),
            offset: record.offset,
            state: record.state.name(),
            length: record.state.length(),
            payload_len,
            hex: is_data.then(|| to_hex(&record.preview)),
            truncated: is_data && record.preview.len() < payload_len,
        }
    }
}

/// Which records a dump includes.
#[derive(Debug, Clone, Copy)]
pub struct DumpOptions {
    /// Skip records with a smaller id.
    pub from_id: u64,
    /// Stop after this many records.
    pub limit: Option<usize>,
    /// Payload bytes shown per record.
    pub max_bytes: usize,
    /// Include padding and uncommitted records.
    pub all: bool,
}

/// Collects the records selected by `options`.
pub fn collect_records(
    storage: &dyn PagedStorage,
    allocated_up_to: u64,
    options: DumpOptions,
) -> Result<Vec<DumpRecord>, Box<dyn std::error::Error>> {
    let until = allocated_up_to.min(storage.actual_file_size()?);
    let mut records = Vec::new();
    for scanned in RecordScanner::new(storage, until).with_preview(options.max_bytes) {
        let scanned = scanned?;
        if scanned.id.as_u64() < options.from_id {
            continue;
        }
        if !options.all && !matches!(scanned.state, RecordState::CommittedData { .. }) {
            continue;
        }
        if options.limit.is_some_and(|limit| records.len() >= limit) {
            break;
        }
        records.push(DumpRecord::from_scanned(&scanned));
    }
    Ok(records)
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    page_size: Option<u32>,
    options: DumpOptions,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let (header, storage) = open_read_only_storage(path, page_size)?;
    let records = collect_records(&storage, header.allocated_up_to, options)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text => {
            println!("Log records from {:?}", path);
            println!("==========================");
            println!();
            for record in &records {
                print!(
                    "[id: {}][offset: {}][len: {}][{}]",
                    record.id, record.offset, record.length, record.state
                );
                if let Some(hex) = &record.hex {
                    print!("[hex: {hex}{}]", if record.truncated { " ..." } else { "" });
                }
                println!();
            }
            println!();
            println!("Total: {} records", records.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::sample_log;

    fn options() -> DumpOptions {
        DumpOptions {
            from_id: 0,
            limit: None,
            max_bytes: 3,
            all: false,
        }
    }

    #[test]
    fn dumps_committed_records() {
        let (_dir, path) = sample_log(5);
        let (header, storage) = open_read_only_storage(&path, None).unwrap();
        let records = collect_records(&storage, header.allocated_up_to, options()).unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].hex.as_deref(), Some("010101"));
        assert!(records[1].truncated);
        assert_eq!(records[1].payload_len, 5);
    }

    #[test]
    fn from_id_and_limit() {
        let (_dir, path) = sample_log(10);
        let (header, storage) = open_read_only_storage(&path, None).unwrap();
        let records = collect_records(
            &storage,
            header.allocated_up_to,
            DumpOptions {
                from_id: 7,
                limit: Some(2),
                ..options()
            },
        )
        .unwrap();

        // Records are 12 bytes apart, so ids step by 3.
        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![7, 10]);
    }

    #[test]
    fn all_includes_padding() {
        // 16 records fill page 0 exactly; page 1 fits 21 and pads 4 bytes.
        let (_dir, path) = sample_log(40);
        let (header, storage) = open_read_only_storage(&path, None).unwrap();
        let records = collect_records(
            &storage,
            header.allocated_up_to,
            DumpOptions {
                all: true,
                ..options()
            },
        )
        .unwrap();

        assert!(records.iter().any(|r| r.state == "padding" && r.hex.is_none()));
        assert_eq!(records.iter().filter(|r| r.state == "data").count(), 40);
    }

    #[test]
    fn hex_matches_log_dump() {
        let (_dir, path) = sample_log(3);
        let (header, storage) = open_read_only_storage(&path, None).unwrap();
        let records = collect_records(&storage, header.allocated_up_to, options()).unwrap();
        drop(storage);

        let log = aolog_core::AppendOnlyLog::open_with_config(
            &path,
            aolog_core::LogConfig::default().page_size(256),
        )
        .unwrap();
        let dump = log
            .dump_content_around_id(aolog_core::RecordId(records[2].id), 0, 3)
            .unwrap();
        let hex = records[2].hex.as_deref().unwrap();
        assert_eq!(hex, "020202");
        assert!(dump.contains(&format!("[hex: {hex} ...]")), "{dump}");
    }
}
