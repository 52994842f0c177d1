//! The append-only log engine.

use crate::config::{validate_log_page_size, LogConfig};
use crate::error::{LogError, LogResult};
use crate::log::header::{HeaderFields, HeaderSnapshot, STATUS_CLOSED, STATUS_OPENED};
use crate::log::record::{
    fits_in_page, payload_view, write_data_record, write_padding, RecordState, LENGTH_MASK,
    RECORD_HEADER_SIZE,
};
use crate::log::recovery::{recount_records, recover};
use crate::log::scan::{verify_storage, RecordScanner, VerifyReport};
use crate::log::walker::RecordWalker;
use crate::log::HEADER_SIZE;
use crate::types::RecordId;
use aolog_storage::{InMemoryPagedStorage, MmapPagedStorage, Page, PagedStorage, StorageOptions};
use parking_lot::RwLock;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// An append-only log of byte records over a paged storage.
///
/// Any number of threads may append, read and iterate concurrently through
/// a shared reference. All shared state lives in the mapped header page and
/// is updated with compare-and-swap loops; no lock is taken on the append
/// or read path beyond looking up pages.
///
/// # Durability
///
/// Appended records are in the mapped file as soon as `append` returns and
/// survive a process crash. [`flush(true)`](Self::flush) additionally
/// fsyncs, which is needed to survive an OS crash.
///
/// # Example
///
/// ```no_run
/// use aolog_core::{AppendOnlyLog, LogConfig};
/// use std::path::Path;
///
/// let log = AppendOnlyLog::open_with_config(
///     Path::new("records.log"),
///     LogConfig::default().page_size(64 * 1024),
/// ).unwrap();
///
/// let id = log.append(b"first").unwrap();
/// log.for_each_record(|id, payload| {
///     println!("{id}: {} bytes", payload.len());
///     true
/// }).unwrap();
/// log.close().unwrap();
/// ```
pub struct AppendOnlyLog {
    config: LogConfig,
    storage: Box<dyn PagedStorage>,
    /// `None` once closed.
    header: RwLock<Option<HeaderFields>>,
    recovered_region: Option<(u64, u64)>,
    was_closed_properly: bool,
}

impl AppendOnlyLog {
    /// Opens or creates a file-backed log with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, has an incompatible
    /// format, or recovery fails.
    pub fn open(path: &Path) -> LogResult<Self> {
        Self::open_with_config(path, LogConfig::default())
    }

    /// Opens or creates a file-backed log.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the file cannot be
    /// opened, its format or page size disagree, or recovery fails.
    pub fn open_with_config(path: &Path, config: LogConfig) -> LogResult<Self> {
        config.validate()?;
        if fs::metadata(path).is_ok_and(|meta| meta.len() > 0) {
            // Rejects foreign files before mapping can grow them.
            HeaderSnapshot::read_from(path)?.check_compatible(Some(path), config.page_size)?;
        }
        let options = StorageOptions::default()
            .create_if_missing(config.create_if_missing)
            .create_dirs(config.create_dirs);
        let storage = MmapPagedStorage::open_with_options(path, config.page_size, options)?;
        Self::open_with_storage(Box::new(storage), config)
    }

    /// Creates a log over fresh heap pages.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size is invalid.
    pub fn open_in_memory(page_size: u32) -> LogResult<Self> {
        let config = LogConfig::default().page_size(page_size);
        config.validate()?;
        let storage = InMemoryPagedStorage::new(page_size)?;
        Self::open_with_storage(Box::new(storage), config)
    }

    /// Opens a log over an existing storage.
    ///
    /// The storage's page size is authoritative; `config.page_size` is only
    /// used when this crate creates the storage itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size is unusable, the header is
    /// incompatible, the cursors are corrupted, or recovery fails.
    pub fn open_with_storage(storage: Box<dyn PagedStorage>, config: LogConfig) -> LogResult<Self> {
        let page_size = storage.page_size();
        validate_log_page_size(page_size)?;

        let file_size = storage.actual_file_size()?;
        let file_is_empty = file_size == 0;
        if !file_is_empty && file_size < u64::from(page_size) {
            return Err(LogError::format_incompatible(format!(
                "[{}] holds {file_size} bytes, less than one page of {page_size}",
                storage
                    .storage_path()
                    .map_or_else(|| "<memory>".to_string(), |p| p.display().to_string())
            )));
        }
        let header = HeaderFields::new(storage.page_by_offset(0)?);
        if file_is_empty {
            header.initialize(page_size)?;
        } else {
            header
                .snapshot()?
                .check_compatible(storage.storage_path(), page_size)?;
        }

        let mut allocated = header.allocated_up_to()?;
        if allocated == 0 {
            allocated = HEADER_SIZE;
            header.set_allocated_up_to(allocated)?;
        }
        let mut committed = header.committed_up_to()?;
        if committed == 0 {
            committed = HEADER_SIZE;
            header.set_committed_up_to(committed)?;
        }
        check_cursors(committed, allocated)?;

        let was_closed_properly = header.status()? == STATUS_CLOSED;
        let recovered_region = if committed < allocated {
            warn!(
                path = ?storage.storage_path(),
                committed,
                allocated,
                closed_properly = was_closed_properly,
                "log has unfinished appends, recovering"
            );
            let recovered_until = recover(storage.as_ref(), &header, committed, allocated)?;
            warn!(
                path = ?storage.storage_path(),
                recovered_until,
                records = header.records_count()?,
                "log recovered"
            );
            Some((committed, allocated))
        } else {
            if !was_closed_properly {
                warn!(
                    path = ?storage.storage_path(),
                    "log was not closed properly, recounting records"
                );
                recount_records(storage.as_ref(), &header, committed)?;
            }
            None
        };

        header.set_status(STATUS_OPENED)?;
        storage.fsync()?;

        if file_is_empty {
            debug!(path = ?storage.storage_path(), page_size, "created log");
        } else {
            info!(
                path = ?storage.storage_path(),
                records = header.records_count()?,
                "opened log"
            );
        }

        Ok(Self {
            config,
            storage,
            header: RwLock::new(Some(header)),
            recovered_region,
            was_closed_properly,
        })
    }

    pub(crate) fn storage(&self) -> &dyn PagedStorage {
        self.storage.as_ref()
    }

    fn header(&self) -> LogResult<HeaderFields> {
        self.header.read().clone().ok_or(LogError::ClosedStorage)
    }

    /// Appends a record with a copy of `payload`.
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` if the payload does not fit in a page,
    /// `ClosedStorage` after close, or a storage error.
    pub fn append(&self, payload: &[u8]) -> LogResult<RecordId> {
        self.append_record(payload.len(), |page, at| {
            page.store_bytes(at, payload)?;
            Ok(())
        })
    }

    /// Appends a record of `payload_len` bytes filled in by `writer`.
    ///
    /// The record's space is claimed first; `writer` then fills a
    /// zero-initialized buffer that is copied into the record. If it fails,
    /// the partial buffer is still copied but the record stays uncommitted:
    /// it is never readable, and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge`, `ClosedStorage`, the writer's error as
    /// `Io`, or a storage error.
    pub fn append_with<F>(&self, payload_len: usize, writer: F) -> LogResult<RecordId>
    where
        F: FnOnce(&mut [u8]) -> io::Result<()>,
    {
        self.append_record(payload_len, |page, at| {
            let mut buf = vec![0u8; payload_len];
            let written = writer(&mut buf);
            // Whatever the writer produced lands in the record, committed or not.
            page.store_bytes(at, &buf)?;
            written?;
            Ok(())
        })
    }

    fn append_record<F>(&self, payload_len: usize, fill: F) -> LogResult<RecordId>
    where
        F: FnOnce(&Page, usize) -> LogResult<()>,
    {
        let header = self.header()?;
        let max = self.max_payload_size();
        if payload_len > max {
            return Err(LogError::PayloadTooLarge {
                len: payload_len,
                max,
            });
        }

        let total_length = ((payload_len + RECORD_HEADER_SIZE + 3) & !3) as u64;
        let offset = self.allocate_space_for_record(&header, total_length)?;

        let page = self.storage.page_by_offset(offset)?;
        let in_page = self.storage.to_offset_in_page(offset);
        if let Err(err) = write_data_record(&page, in_page, payload_len, fill) {
            warn!(offset, payload_len, error = %err, "record left uncommitted");
            return Err(err);
        }

        self.try_commit_finalized_records(&header)?;
        Ok(RecordId::from_offset(offset))
    }

    fn allocate_space_for_record(&self, header: &HeaderFields, total_length: u64) -> LogResult<u64> {
        let page_size = u64::from(self.storage.page_size());
        loop {
            let offset = header.allocated_up_to()?;
            let in_page = offset % page_size;
            let remaining = page_size - in_page;

            if total_length <= remaining {
                if header.cas_allocated_up_to(offset, offset + total_length)? {
                    return Ok(offset);
                }
                continue;
            }

            // Offsets, lengths and the page size are all 4-aligned.
            if remaining < RECORD_HEADER_SIZE as u64 {
                return Err(LogError::invariant_violation(format!(
                    "{remaining} bytes left on the page at offset {offset}, \
                     less than a record header (record length {total_length})"
                )));
            }
            if header.cas_allocated_up_to(offset, offset + remaining)? {
                let page = self.storage.page_by_offset(offset)?;
                write_padding(&page, in_page as usize, remaining as usize)?;
                debug!(offset, remaining, "padded page tail");
            }
        }
    }

    /// Moves the committed cursor over every finished record after it.
    ///
    /// Every appender runs this after its own write, not just the one whose
    /// record sits at the cursor.
    fn try_commit_finalized_records(&self, header: &HeaderFields) -> LogResult<()> {
        let mut walker = RecordWalker::new(self.storage.as_ref());
        loop {
            let committed = header.committed_up_to()?;
            let allocated = header.allocated_up_to()?;

            let mut offset = committed;
            let mut data_records = 0u32;
            while offset < allocated {
                let state = walker.state_at(offset)?;
                match state {
                    RecordState::Unwritten | RecordState::AllocatedUncommitted { .. } => break,
                    RecordState::CommittedData { .. } => data_records += 1,
                    RecordState::CommittedPadding { .. } => {}
                }
                offset = walker.next_offset(offset, state)?;
            }

            if offset == committed {
                return Ok(());
            }
            if header.cas_committed_up_to(committed, offset)? {
                header.add_records_count(data_records)?;
                return Ok(());
            }
        }
    }

    /// Reads the payload of record `id` through `reader`.
    ///
    /// A record is readable as soon as its own header is committed, even if
    /// earlier records are still being written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for the null id or an id past the allocated
    /// region, `NotCommittedOrCorrupted` for padding, unfinished or damaged
    /// records, and `ClosedStorage` after close.
    pub fn read<T, F>(&self, id: RecordId, reader: F) -> LogResult<T>
    where
        F: FnOnce(&[u8]) -> T,
    {
        let header = self.header()?;
        let offset = id
            .to_offset()
            .ok_or_else(|| LogError::invalid_id(id.as_u64(), "null or out-of-range id"))?;

        let allocated = header.allocated_up_to()?;
        if offset >= allocated {
            return Err(LogError::invalid_id(
                id.as_u64(),
                format!(
                    "offset {offset} is outside of the allocated region [..{allocated}) {}",
                    self.diagnostics(offset)
                ),
            ));
        }

        let page = self.storage.page_by_offset(offset)?;
        let in_page = self.storage.to_offset_in_page(offset);
        let raw = page.load_u32(in_page)?;
        let state = match RecordState::decode(raw) {
            Ok(state) => state,
            Err(_) => {
                return Err(self.read_failure(
                    id,
                    format!("[@{offset}] has a malformed header {raw:#010x}"),
                ))
            }
        };

        match state {
            RecordState::CommittedData { .. } => {
                let payload_len = state.payload_length();
                if !fits_in_page(in_page, payload_len, page.len()) {
                    return Err(self.read_failure(
                        id,
                        format!(
                            "[@{offset}] payload length {payload_len} does not fit the page \
                             [0..{}) (committed up to {}, allocated up to {allocated})",
                            page.len(),
                            header.committed_up_to()?
                        ),
                    ));
                }
                let end = offset + (RECORD_HEADER_SIZE + payload_len) as u64;
                if end <= header.committed_up_to()? {
                    Ok(reader(payload_view(&page, in_page, payload_len)?))
                } else {
                    // Past the committed cursor `id` may point inside another
                    // record, so the bytes may still be being written.
                    let payload = page.load_bytes(in_page + RECORD_HEADER_SIZE, payload_len)?;
                    Ok(reader(&payload))
                }
            }
            RecordState::CommittedPadding { .. } => Err(LogError::not_committed(
                id.as_u64(),
                format!(
                    "[@{offset}] is a padding record (header {raw:#010x}) and has no data {}",
                    self.diagnostics(offset)
                ),
            )),
            RecordState::AllocatedUncommitted { .. } | RecordState::Unwritten => {
                Err(self.read_failure(
                    id,
                    format!(
                        "[@{offset}] is not committed (header {raw:#010x}): \
                         either not yet written or corrupted"
                    ),
                ))
            }
        }
    }

    /// Reads record `id` into a new vector.
    ///
    /// # Errors
    ///
    /// See [`read`](Self::read).
    pub fn read_to_vec(&self, id: RecordId) -> LogResult<Vec<u8>> {
        self.read(id, <[u8]>::to_vec)
    }

    fn read_failure(&self, id: RecordId, what: String) -> LogError {
        let mut message = what;
        if let Some(offset) = id.to_offset() {
            let diagnostics = self.diagnostics(offset);
            if !diagnostics.is_empty() {
                message.push(' ');
                message.push_str(&diagnostics);
            }
        }
        if self.config.dump_on_error {
            message.push('\n');
            match self.dump_content_around_id(
                id,
                self.config.dump_region_width,
                self.config.max_record_bytes_to_dump,
            ) {
                Ok(dump) => message.push_str(&dump),
                Err(err) => message.push_str(&format!("(content dump failed: {err})")),
            }
        }
        LogError::not_committed(id.as_u64(), message)
    }

    /// Describes the recovery and close state in relation to `offset`.
    fn diagnostics(&self, offset: u64) -> String {
        if !self.config.diagnostics {
            return String::new();
        }
        let unclean = if self.was_closed_properly {
            ""
        } else {
            " and the log was not closed properly"
        };
        match self.recovered_region {
            None if self.was_closed_properly => "(no recovery ran at open)".to_string(),
            None => "(no recovery ran at open, but the log was not closed properly)".to_string(),
            Some((start, end)) if (start..end).contains(&offset) => format!(
                "(record is inside the region [{start}..{end}) recovered at open{unclean}, \
                 it may be an unfinished record)"
            ),
            Some((start, end)) => format!(
                "(a recovery ran at open{unclean}, but the record is outside \
                 the recovered region [{start}..{end}))"
            ),
        }
    }

    /// Returns `true` if `id` addresses an allocated slot.
    ///
    /// This is a plausibility check only: an id that points into the middle
    /// of a record is not detected.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close.
    pub fn is_valid_id(&self, id: RecordId) -> LogResult<bool> {
        let header = self.header()?;
        match id.to_offset() {
            Some(offset) => Ok(offset < header.allocated_up_to()?),
            None => Ok(false),
        }
    }

    /// Calls `reader` for every committed data record in append order.
    ///
    /// Padding and unfinished records are skipped; the walk ends at the
    /// first unwritten slot. Returns `false` if `reader` stopped the walk.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` for malformed headers, `ClosedStorage` after
    /// close, or a storage error.
    pub fn for_each_record<F>(&self, reader: F) -> LogResult<bool>
    where
        F: FnMut(RecordId, &[u8]) -> bool,
    {
        let allocated = self.header()?.allocated_up_to()?;
        self.walk_records(allocated, reader)
    }

    /// Like [`for_each_record`](Self::for_each_record), but only visits
    /// records with an id below `until`.
    ///
    /// # Errors
    ///
    /// See [`for_each_record`](Self::for_each_record).
    pub fn for_each_record_until<F>(&self, until: RecordId, reader: F) -> LogResult<bool>
    where
        F: FnMut(RecordId, &[u8]) -> bool,
    {
        let allocated = self.header()?.allocated_up_to()?;
        let limit = until.to_offset().map_or(allocated, |offset| offset.min(allocated));
        self.walk_records(limit, reader)
    }

    fn walk_records<F>(&self, until_offset: u64, mut reader: F) -> LogResult<bool>
    where
        F: FnMut(RecordId, &[u8]) -> bool,
    {
        let page_size = self.storage.page_size() as usize;
        let mut walker = RecordWalker::new(self.storage.as_ref());
        let mut offset = HEADER_SIZE;
        while offset < until_offset {
            let state = walker.state_at(offset)?;
            match state {
                RecordState::Unwritten => return Ok(true),
                RecordState::CommittedData { .. } => {
                    let id = RecordId::from_offset(offset);
                    let payload_len = state.payload_length();
                    let (page, in_page) = walker.locate(offset)?;
                    if !fits_in_page(in_page, payload_len, page_size) {
                        return Err(LogError::corrupted(format!(
                            "record {id} [@{offset}] payload length {payload_len} \
                             does not fit the page {}",
                            self.diagnostics(offset)
                        )));
                    }
                    if !reader(id, payload_view(page, in_page, payload_len)?) {
                        return Ok(false);
                    }
                }
                RecordState::AllocatedUncommitted { .. } | RecordState::CommittedPadding { .. } => {}
            }
            offset = walker.next_offset(offset, state)?;
        }
        Ok(true)
    }

    /// Collects every committed data record.
    ///
    /// # Errors
    ///
    /// See [`for_each_record`](Self::for_each_record).
    pub fn read_all(&self) -> LogResult<Vec<(RecordId, Vec<u8>)>> {
        let mut records = Vec::new();
        self.for_each_record(|id, payload| {
            records.push((id, payload.to_vec()));
            true
        })?;
        Ok(records)
    }

    /// Returns a raw scanner over every record slot, padding included.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close.
    pub fn scan(&self) -> LogResult<RecordScanner<'_>> {
        let allocated = self.header()?.allocated_up_to()?;
        Ok(RecordScanner::new(self.storage.as_ref(), allocated))
    }

    /// Runs a structural verification of the log.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close, or any error the walk raises.
    pub fn verify(&self) -> LogResult<VerifyReport> {
        self.header()?;
        verify_storage(self.storage.as_ref())
    }

    /// Returns `true` if nothing was ever allocated.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close.
    pub fn is_empty(&self) -> LogResult<bool> {
        let header = self.header()?;
        Ok(header.allocated_up_to()? == HEADER_SIZE && header.committed_up_to()? == HEADER_SIZE)
    }

    /// Returns the number of committed data records.
    ///
    /// Records committed after a still-unfinished one are not counted until
    /// the unfinished record completes.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close.
    pub fn records_count(&self) -> LogResult<u32> {
        self.header()?.records_count()
    }

    /// Flushes the log; with `fsync`, forces it to durable storage.
    ///
    /// Without `fsync` this is a no-op: writes are already in the mapping.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close, or the fsync error.
    pub fn flush(&self, fsync: bool) -> LogResult<()> {
        self.header()?;
        if fsync {
            self.storage.fsync()?;
            debug!(path = ?self.storage_path(), "log fsynced");
        }
        Ok(())
    }

    /// Flushes with the configured `fsync_on_flush` flag.
    ///
    /// # Errors
    ///
    /// See [`flush`](Self::flush).
    pub fn flush_default(&self) -> LogResult<()> {
        self.flush(self.config.fsync_on_flush)
    }

    /// Returns the caller-defined data version.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close.
    pub fn data_version(&self) -> LogResult<u32> {
        self.header()?.data_version()
    }

    /// Sets the caller-defined data version.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close.
    pub fn set_data_version(&self, version: u32) -> LogResult<()> {
        self.header()?.set_data_version(version)
    }

    /// Returns caller-defined header field `slot` (`0..USER_FIELDS`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an out-of-range slot, `ClosedStorage`
    /// after close.
    pub fn user_field(&self, slot: usize) -> LogResult<u32> {
        self.header()?.user_field(slot)
    }

    /// Sets caller-defined header field `slot` (`0..USER_FIELDS`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an out-of-range slot, `ClosedStorage`
    /// after close.
    pub fn set_user_field(&self, slot: usize, value: u32) -> LogResult<()> {
        self.header()?.set_user_field(slot, value)
    }

    /// Returns the format version stored in the file.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close.
    pub fn implementation_version(&self) -> LogResult<u32> {
        self.header()?.implementation_version()
    }

    /// Returns a copy of every header field.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close.
    pub fn header_snapshot(&self) -> LogResult<HeaderSnapshot> {
        self.header()?.snapshot()
    }

    /// Returns `true` if recovery ran when this instance was opened.
    #[must_use]
    pub fn was_recovery_needed(&self) -> bool {
        self.recovered_region.is_some()
    }

    /// Returns `true` if the previous session closed the log properly.
    #[must_use]
    pub fn was_closed_properly(&self) -> bool {
        self.was_closed_properly
    }

    /// Returns the `[start, end)` region recovered at open, if any.
    #[must_use]
    pub fn recovered_region(&self) -> Option<(u64, u64)> {
        self.recovered_region
    }

    /// Returns the backing file path, `None` for in-memory logs.
    #[must_use]
    pub fn storage_path(&self) -> Option<&Path> {
        self.storage.storage_path()
    }

    /// Returns the page size in bytes.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.storage.page_size()
    }

    /// Returns the largest payload a single record can hold.
    #[must_use]
    pub fn max_payload_size(&self) -> usize {
        let page_size = self.storage.page_size() as usize;
        page_size.min(LENGTH_MASK as usize) - RECORD_HEADER_SIZE
    }

    /// Returns `true` until the log is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.header.read().is_some()
    }

    /// Marks the log closed, flushes and closes the storage.
    ///
    /// Closing twice is a no-op. Every later call fails with `ClosedStorage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or storage close fails.
    pub fn close(&self) -> LogResult<()> {
        let Some(header) = self.header.write().take() else {
            return Ok(());
        };
        header.set_status(STATUS_CLOSED)?;
        if self.config.fsync_on_flush {
            self.storage.fsync()?;
        }
        self.storage.close()?;
        debug!(path = ?self.storage_path(), "closed log");
        Ok(())
    }

    /// Closes the log and releases every mapping the storage holds.
    ///
    /// # Errors
    ///
    /// See [`close`](Self::close).
    pub fn close_and_unsafely_unmap(&self) -> LogResult<()> {
        self.close()?;
        self.storage.close_and_unmap()?;
        Ok(())
    }

    /// Closes the log and deletes its backing file.
    ///
    /// # Errors
    ///
    /// Returns an error if closing fails or the file cannot be removed.
    pub fn close_and_clean(&self) -> LogResult<()> {
        self.close()?;
        self.storage.close_and_clean()?;
        Ok(())
    }
}

fn check_cursors(committed: u64, allocated: u64) -> LogResult<()> {
    for (name, cursor) in [("committed", committed), ("allocated", allocated)] {
        if cursor < HEADER_SIZE || cursor % 4 != 0 {
            return Err(LogError::corrupted(format!(
                "{name} cursor {cursor} is misaligned or inside the header"
            )));
        }
    }
    if committed > allocated {
        return Err(LogError::corrupted(format!(
            "committed cursor {committed} is past the allocated cursor {allocated}"
        )));
    }
    Ok(())
}

impl Drop for AppendOnlyLog {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(path = ?self.storage_path(), error = %err, "failed to close log on drop");
        }
    }
}

impl fmt::Debug for AppendOnlyLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppendOnlyLog")
            .field("path", &self.storage.storage_path())
            .field("page_size", &self.storage.page_size())
            .field("open", &self.is_open())
            .field("was_closed_properly", &self.was_closed_properly)
            .field("recovered_region", &self.recovered_region)
            .finish()
    }
}
