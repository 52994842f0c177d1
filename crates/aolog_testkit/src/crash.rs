//! Crash simulation for append-only logs.
//!
//! A process that dies mid-append leaves one of a few recognizable states
//! behind. This module reproduces each of them, either by abandoning a live
//! log or by editing the file of a dead one, and checks what the next open
//! makes of it.
//!
//! ## Crash Points
//!
//! 1. **Before close**: everything committed, status still "opened"
//! 2. **After allocation**: space claimed, header never stamped
//! 3. **During payload write**: header stamped uncommitted, payload partial
//! 4. **After commit, before count**: cursors agree, count is stale
//!
//! ## Usage
//!
//! ```rust
//! use aolog_testkit::crash::{run_crash_scenario, CrashPoint};
//!
//! let result = run_crash_scenario(CrashPoint::DuringPayloadWrite, 256, 10).unwrap();
//! assert!(result.passed, "{:?}", result.failures);
//! ```

use crate::fixtures::{scenarios::payload_for, TestLog};
use aolog_core::log::header::{
    ALLOCATED_UP_TO_OFFSET, COMMITTED_UP_TO_OFFSET, RECORDS_COUNT_OFFSET, STATUS_OFFSET,
};
use aolog_core::log::record::{is_padding, record_length, LENGTH_MASK};
use aolog_core::{AppendOnlyLog, HeaderSnapshot, LogError, LogResult, RecordId, HEADER_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Abandons `log` without closing it, as a killed process would.
///
/// Nothing is flushed or unmapped and the status field keeps saying
/// "opened". The mapping and file handle are leaked.
pub fn simulate_process_death(log: AppendOnlyLog) {
    std::mem::forget(log);
}

/// Starts an append whose writer fails after `written_prefix` bytes.
///
/// The record stays allocated but uncommitted. Returns its id.
/// Only meaningful while no other thread appends.
pub fn abandon_append(
    log: &AppendOnlyLog,
    payload_len: usize,
    written_prefix: usize,
) -> LogResult<RecordId> {
    let result = log.append_with(payload_len, |slot| {
        let prefix = written_prefix.min(slot.len());
        slot[..prefix].fill(0xCD);
        Err(io::Error::new(io::ErrorKind::Interrupted, "simulated crash"))
    });
    match result {
        Err(LogError::Io(_)) => {}
        Err(other) => return Err(other),
        Ok(id) => {
            return Err(LogError::invariant_violation(format!(
                "abandoned append {id} was committed"
            )))
        }
    }
    let allocated = log.header_snapshot()?.allocated_up_to;
    let length = (payload_len as u64 + 4 + 3) & !3;
    Ok(RecordId::from_offset(allocated - length))
}

/// Direct access to the bytes of a log file that is not open.
///
/// Used to fabricate states a live log never produces on its own.
#[derive(Debug)]
pub struct RawLogFile {
    file: File,
    path: PathBuf,
}

impl RawLogFile {
    /// Opens an existing log file for raw editing.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decodes the current header.
    pub fn header(&mut self) -> LogResult<HeaderSnapshot> {
        let mut bytes = [0u8; HEADER_SIZE as usize];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut bytes)?;
        HeaderSnapshot::from_bytes(&bytes)
    }

    fn read_u32_at(&mut self, offset: u64) -> io::Result<u32> {
        let mut buf = [0u8; 4];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(u32::from_ne_bytes(buf))
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)
    }

    /// Overwrites the status field.
    pub fn set_status(&mut self, status: u32) -> io::Result<()> {
        self.write_at(STATUS_OFFSET as u64, &status.to_ne_bytes())
    }

    /// Overwrites both cursors.
    pub fn set_cursors(&mut self, committed: u64, allocated: u64) -> io::Result<()> {
        self.write_at(COMMITTED_UP_TO_OFFSET as u64, &committed.to_ne_bytes())?;
        self.write_at(ALLOCATED_UP_TO_OFFSET as u64, &allocated.to_ne_bytes())
    }

    /// Overwrites the records count.
    pub fn set_records_count(&mut self, count: u32) -> io::Result<()> {
        self.write_at(RECORDS_COUNT_OFFSET as u64, &count.to_ne_bytes())
    }

    fn offset_of(id: RecordId) -> LogResult<u64> {
        id.to_offset()
            .ok_or_else(|| LogError::invalid_id(id.as_u64(), "no offset for id"))
    }

    /// Returns the raw header of record `id`.
    pub fn record_header(&mut self, id: RecordId) -> LogResult<u32> {
        let offset = Self::offset_of(id)?;
        Ok(self.read_u32_at(offset)?)
    }

    /// Overwrites the raw header of record `id`.
    pub fn set_record_header(&mut self, id: RecordId, header: u32) -> LogResult<()> {
        let offset = Self::offset_of(id)?;
        Ok(self.write_at(offset, &header.to_ne_bytes())?)
    }

    /// Clears the committed bit of record `id` and pulls the committed
    /// cursor back to it, as if the writer died before committing.
    pub fn uncommit_record(&mut self, id: RecordId) -> LogResult<()> {
        let offset = Self::offset_of(id)?;
        let header = self.read_u32_at(offset)?;
        if header == 0 || is_padding(header) {
            return Err(LogError::invalid_argument(format!(
                "record {id} at offset {offset} is not a data record"
            )));
        }
        self.write_at(offset, &(header & LENGTH_MASK).to_ne_bytes())?;

        let snapshot = self.header()?;
        if snapshot.committed_up_to > offset {
            self.set_cursors(offset, snapshot.allocated_up_to)?;
        }
        Ok(())
    }

    /// Claims `len` bytes past the allocated cursor without stamping a
    /// header, as if the appender died right after allocating.
    ///
    /// Returns the id the abandoned record would have had.
    pub fn append_gap(&mut self, len: u64) -> LogResult<RecordId> {
        let snapshot = self.header()?;
        let offset = snapshot.allocated_up_to;
        let page_size = u64::from(snapshot.page_size);
        let length = (len + 3) & !3;
        if length == 0 || offset % page_size + length > page_size {
            return Err(LogError::invalid_argument(format!(
                "a gap of {len} bytes at offset {offset} does not fit the page"
            )));
        }
        self.set_cursors(snapshot.committed_up_to, offset + length)?;
        Ok(RecordId::from_offset(offset))
    }

    /// Returns the stored length of every record, walking from the header.
    pub fn record_lengths(&mut self) -> LogResult<Vec<u64>> {
        let snapshot = self.header()?;
        let mut offset = HEADER_SIZE;
        let mut lengths = Vec::new();
        while offset < snapshot.allocated_up_to {
            let header = self.read_u32_at(offset)?;
            let length = record_length(header);
            if length == 0 {
                break;
            }
            lengths.push(length);
            offset += length;
        }
        Ok(lengths)
    }

    /// Flushes the edits to disk.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// All appends finished; the log was never closed.
    BeforeClose,
    /// Space was allocated but the record header never stamped.
    AfterAllocation,
    /// The record was stamped uncommitted and its payload half written.
    DuringPayloadWrite,
    /// The committed cursor moved but the records count did not.
    AfterCommitBeforeCount,
}

impl CrashPoint {
    /// Every crash point.
    pub const ALL: [Self; 4] = [
        Self::BeforeClose,
        Self::AfterAllocation,
        Self::DuringPayloadWrite,
        Self::AfterCommitBeforeCount,
    ];
}

/// Outcome of [`run_crash_scenario`].
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// The simulated crash.
    pub point: CrashPoint,
    /// Whether every check held.
    pub passed: bool,
    /// Records expected to survive.
    pub expected_records: usize,
    /// Records readable after reopen.
    pub actual_records: usize,
    /// Whether the reopen ran recovery.
    pub recovery_ran: bool,
    /// Everything that did not hold.
    pub failures: Vec<String>,
}

/// Appends `committed_before` records, crashes at `point`, reopens and
/// checks that exactly the committed records survived.
pub fn run_crash_scenario(
    point: CrashPoint,
    page_size: u32,
    committed_before: usize,
) -> LogResult<CrashRecoveryResult> {
    let mut test_log = TestLog::file(page_size);
    let mut expected: Vec<(RecordId, Vec<u8>)> = Vec::with_capacity(committed_before + 1);
    for i in 0..committed_before {
        let payload = payload_for(i, 1 + i % 13);
        let id = test_log.append(&payload)?;
        expected.push((id, payload));
    }
    let path = test_log
        .path()
        .map(Path::to_path_buf)
        .ok_or_else(|| LogError::invalid_argument("crash scenarios need a file log"))?;

    let mut lost = None;
    match point {
        CrashPoint::BeforeClose => {}
        CrashPoint::DuringPayloadWrite => {
            lost = Some(abandon_append(test_log.log(), 24, 5)?);
            let payload = payload_for(committed_before, 7);
            let id = test_log.append(&payload)?;
            expected.push((id, payload));
        }
        CrashPoint::AfterAllocation | CrashPoint::AfterCommitBeforeCount => {}
    }
    if let Some(log) = test_log.take() {
        simulate_process_death(log);
    }

    let mut raw = RawLogFile::open(&path)?;
    match point {
        CrashPoint::AfterAllocation => lost = Some(raw.append_gap(12)?),
        CrashPoint::AfterCommitBeforeCount => {
            let count = raw.header()?.records_count;
            raw.set_records_count(count.saturating_sub(1))?;
        }
        CrashPoint::BeforeClose | CrashPoint::DuringPayloadWrite => {}
    }
    raw.sync()?;
    drop(raw);

    let log = test_log.reopen_after_crash()?;
    let mut failures = Vec::new();
    let recovery_ran = log.was_recovery_needed();
    let should_recover = matches!(
        point,
        CrashPoint::AfterAllocation | CrashPoint::DuringPayloadWrite
    );
    if recovery_ran != should_recover {
        failures.push(format!("recovery ran: {recovery_ran}, expected {should_recover}"));
    }
    if log.was_closed_properly() {
        failures.push("log reported a proper close".to_string());
    }

    let mut actual_records = 0;
    for (id, payload) in &expected {
        match log.read_to_vec(*id) {
            Ok(found) if found == *payload => actual_records += 1,
            Ok(_) => failures.push(format!("record {id} has a different payload")),
            Err(err) => failures.push(format!("record {id} unreadable: {err}")),
        }
    }
    if let Some(id) = lost {
        if log.read(id, |_| ()).is_ok() {
            failures.push(format!("abandoned record {id} is readable"));
        }
    }
    let count = log.records_count()? as usize;
    if count != expected.len() {
        failures.push(format!("records count {count}, expected {}", expected.len()));
    }
    let iterated = log.read_all()?;
    if iterated != expected {
        failures.push(format!(
            "iteration yields {} records, expected {}",
            iterated.len(),
            expected.len()
        ));
    }
    let report = log.verify()?;
    failures.extend(report.problems);

    // The log must keep accepting appends after recovery.
    let next = log.append(b"after")?;
    if expected.last().is_some_and(|(last, _)| next <= *last) {
        failures.push(format!("append after recovery got id {next}, not past the last record"));
    }

    Ok(CrashRecoveryResult {
        point,
        passed: failures.is_empty(),
        expected_records: expected.len(),
        actual_records,
        recovery_ran,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TEST_PAGE_SIZE;

    #[test]
    fn every_crash_point_recovers() {
        for point in CrashPoint::ALL {
            let result = run_crash_scenario(point, TEST_PAGE_SIZE, 25).unwrap();
            assert!(result.passed, "{point:?}: {:?}", result.failures);
            assert_eq!(result.actual_records, result.expected_records);
        }
    }

    #[test]
    fn crash_on_empty_log() {
        for point in CrashPoint::ALL {
            if point == CrashPoint::AfterCommitBeforeCount {
                continue;
            }
            let result = run_crash_scenario(point, TEST_PAGE_SIZE, 0).unwrap();
            assert!(result.passed, "{point:?}: {:?}", result.failures);
        }
    }

    #[test]
    fn abandoned_append_is_uncommitted() {
        let test_log = TestLog::memory(TEST_PAGE_SIZE);
        test_log.append(b"a").unwrap();
        let id = abandon_append(test_log.log(), 10, 3).unwrap();

        assert_eq!(id, RecordId(3));
        assert!(matches!(
            test_log.read(id, |_| ()),
            Err(LogError::NotCommittedOrCorrupted { .. })
        ));
    }

    #[test]
    fn uncommitted_record_in_file_is_recovered() {
        let mut test_log = TestLog::file(TEST_PAGE_SIZE);
        let ids: Vec<RecordId> = (0..5u8).map(|i| test_log.append(&[i; 6]).unwrap()).collect();
        test_log.take().unwrap().close().unwrap();

        let mut raw = RawLogFile::open(test_log.path().unwrap()).unwrap();
        raw.uncommit_record(ids[3]).unwrap();
        assert_eq!(raw.header().unwrap().committed_up_to, ids[3].to_offset().unwrap());
        drop(raw);

        let log = test_log.reopen_after_crash().unwrap();
        assert!(log.was_recovery_needed());
        assert!(log.was_closed_properly());
        assert_eq!(log.records_count().unwrap(), 4);
        assert!(log.read(ids[3], |_| ()).is_err());
        assert_eq!(log.read_to_vec(ids[4]).unwrap(), vec![4u8; 6]);
    }

    #[test]
    fn gap_truncates_everything_after_it() {
        let mut test_log = TestLog::file(TEST_PAGE_SIZE);
        test_log.append(b"before").unwrap();
        simulate_process_death(test_log.take().unwrap());

        let mut raw = RawLogFile::open(test_log.path().unwrap()).unwrap();
        let gap = raw.append_gap(8).unwrap();
        let lengths = raw.record_lengths().unwrap();
        assert_eq!(lengths, vec![12]);
        drop(raw);

        let log = test_log.reopen_after_crash().unwrap();
        assert_eq!(log.recovered_region().map(|(s, _)| s), gap.to_offset());
        let next = log.append(b"x").unwrap();
        assert_eq!(next, gap);
    }

    #[test]
    fn gap_must_fit_the_page() {
        let mut test_log = TestLog::file(TEST_PAGE_SIZE);
        test_log.take().unwrap().close().unwrap();

        let mut raw = RawLogFile::open(test_log.path().unwrap()).unwrap();
        assert!(matches!(
            raw.append_gap(u64::from(TEST_PAGE_SIZE)),
            Err(LogError::InvalidArgument { .. })
        ));
    }
}
