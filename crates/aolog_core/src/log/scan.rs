//! Raw record scanning and structural verification.
//!
//! Unlike [`AppendOnlyLog::for_each_record`](crate::AppendOnlyLog::for_each_record),
//! the scanner reports every slot it walks over, padding and unfinished
//! records included. The verifier builds on it to check a log without
//! repairing anything; the CLI's `verify` command is a thin wrapper.

use crate::error::{LogError, LogResult};
use crate::log::header::{HeaderFields, HeaderSnapshot};
use crate::log::record::{fits_in_page, payload_view, RecordState};
use crate::log::walker::RecordWalker;
use crate::log::HEADER_SIZE;
use crate::types::RecordId;
use aolog_storage::PagedStorage;

/// One record slot found by a [`RecordScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    /// Id derived from the slot offset.
    pub id: RecordId,
    /// File offset of the record header.
    pub offset: u64,
    /// Decoded header.
    pub state: RecordState,
    /// Leading payload bytes of committed data records, empty otherwise.
    pub preview: Vec<u8>,
}

/// Iterator over every non-empty record slot below a limit offset.
///
/// Stops at the first unwritten slot. After an error the iterator is
/// exhausted.
pub struct RecordScanner<'a> {
    walker: RecordWalker<'a>,
    page_size: usize,
    offset: u64,
    until: u64,
    preview_bytes: usize,
    finished: bool,
}

impl<'a> RecordScanner<'a> {
    /// Creates a scanner over `[HEADER_SIZE, until)`.
    #[must_use]
    pub fn new(storage: &'a dyn PagedStorage, until: u64) -> Self {
        Self {
            walker: RecordWalker::new(storage),
            page_size: storage.page_size() as usize,
            offset: HEADER_SIZE,
            until,
            preview_bytes: 0,
            finished: false,
        }
    }

    /// Copies up to `bytes` leading payload bytes into each scanned record.
    #[must_use]
    pub fn with_preview(mut self, bytes: usize) -> Self {
        self.preview_bytes = bytes;
        self
    }

    /// Returns the offset the next call to `next` inspects.
    ///
    /// After the scan ends this is where it stopped: the limit, or the first
    /// unwritten slot.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn scan_one(&mut self) -> LogResult<Option<ScannedRecord>> {
        let offset = self.offset;
        let state = self.walker.state_at(offset)?;
        if state == RecordState::Unwritten {
            return Ok(None);
        }
        let next = self.walker.next_offset(offset, state)?;

        let mut preview = Vec::new();
        if self.preview_bytes > 0 {
            if let RecordState::CommittedData { .. } = state {
                let payload_len = state.payload_length();
                let (page, in_page) = self.walker.locate(offset)?;
                if fits_in_page(in_page, payload_len, self.page_size) {
                    let shown = payload_len.min(self.preview_bytes);
                    preview.extend_from_slice(payload_view(page, in_page, shown)?);
                }
            }
        }

        self.offset = next;
        Ok(Some(ScannedRecord {
            id: RecordId::from_offset(offset),
            offset,
            state,
            preview,
        }))
    }
}

impl Iterator for RecordScanner<'_> {
    type Item = LogResult<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.offset >= self.until {
            return None;
        }
        match self.scan_one() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// Result of [`verify_storage`].
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// Header as found.
    pub header: HeaderSnapshot,
    /// Current size of the storage in bytes.
    pub file_size: u64,
    /// Committed data records walked over.
    pub data_records: u32,
    /// Unfinished data records walked over.
    pub uncommitted_records: u32,
    /// Padding records walked over.
    pub padding_records: u32,
    /// Offset where the walk ended.
    pub scanned_until: u64,
    /// `true` if the next open will run recovery.
    pub needs_recovery: bool,
    /// Everything found wrong, one sentence each.
    pub problems: Vec<String>,
}

impl VerifyReport {
    /// Returns `true` if no problems were found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Verifies the header and walks every record of a log storage.
///
/// Nothing is modified. Structural problems end up in
/// [`VerifyReport::problems`]; only a header that cannot be read or that
/// belongs to another format is returned as an error.
///
/// # Errors
///
/// Returns `FormatIncompatible` for a foreign or empty file, or a storage
/// error.
pub fn verify_storage(storage: &dyn PagedStorage) -> LogResult<VerifyReport> {
    let file_size = storage.actual_file_size()?;
    if file_size < HEADER_SIZE {
        return Err(LogError::format_incompatible(format!(
            "storage holds {file_size} bytes, too short for a log header"
        )));
    }
    let header = HeaderFields::new(storage.page_by_offset(0)?).snapshot()?;
    header.check_compatible(storage.storage_path(), storage.page_size())?;

    let mut problems = Vec::new();
    // A never-opened log stores zero cursors; they mean HEADER_SIZE.
    let allocated = header.allocated_up_to.max(HEADER_SIZE);
    let committed = header.committed_up_to.max(HEADER_SIZE);
    for (name, cursor) in [("allocated", allocated), ("committed", committed)] {
        if cursor % 4 != 0 {
            problems.push(format!("{name} cursor {cursor} is not 4-byte aligned"));
        }
    }
    if committed > allocated {
        problems.push(format!(
            "committed cursor {committed} is past the allocated cursor {allocated}"
        ));
    }
    if allocated > file_size {
        problems.push(format!(
            "allocated cursor {allocated} is past the end of the file ({file_size} bytes)"
        ));
    }

    let mut report = VerifyReport {
        header,
        file_size,
        data_records: 0,
        uncommitted_records: 0,
        padding_records: 0,
        scanned_until: HEADER_SIZE,
        needs_recovery: committed < allocated,
        problems: Vec::new(),
    };

    let mut scanner = RecordScanner::new(storage, allocated.min(file_size));
    let mut walk_failed = false;
    for record in scanner.by_ref() {
        match record {
            Ok(record) => match record.state {
                RecordState::CommittedData { .. } => report.data_records += 1,
                RecordState::CommittedPadding { .. } => report.padding_records += 1,
                RecordState::AllocatedUncommitted { .. } => {
                    report.uncommitted_records += 1;
                    if record.offset < committed {
                        problems.push(format!(
                            "unfinished record {} at offset {} is below the committed cursor {committed}",
                            record.id, record.offset
                        ));
                    }
                }
                RecordState::Unwritten => {}
            },
            Err(err) => {
                walk_failed = true;
                problems.push(format!("record walk failed: {err}"));
            }
        }
    }
    report.scanned_until = scanner.offset();

    if !walk_failed && report.scanned_until < committed {
        problems.push(format!(
            "unwritten gap at offset {} below the committed cursor {committed}",
            report.scanned_until
        ));
    }
    if header.is_closed() && !report.needs_recovery && report.data_records != header.records_count {
        problems.push(format!(
            "records count {} disagrees with {} committed records found",
            header.records_count, report.data_records
        ));
    }

    report.problems = problems;
    Ok(report)
}
