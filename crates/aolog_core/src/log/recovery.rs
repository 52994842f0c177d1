//! Crash recovery of the region between the two cursors.
//!
//! After an unclean shutdown the committed cursor may lag behind the
//! allocated one. Everything in between is reconciled at open:
//!
//! - unfinished data records become padding of the same length, so their
//!   ids stay unreadable forever
//! - the walk stops at the first unwritten slot: nothing past it can be
//!   located, so it is given up
//! - the tail from there to the end of the file is zero-filled and both
//!   cursors are reset to that point
//! - the records count is recomputed from scratch

use crate::error::{LogError, LogResult};
use crate::log::header::HeaderFields;
use crate::log::record::{write_padding, RecordState};
use crate::log::walker::RecordWalker;
use crate::log::HEADER_SIZE;
use aolog_storage::PagedStorage;
use tracing::debug;

/// Turns unfinished records in `[from, to)` into padding.
///
/// Returns the offset up to which the region could be walked.
pub(crate) fn recover_region(storage: &dyn PagedStorage, from: u64, to: u64) -> LogResult<u64> {
    let mut walker = RecordWalker::new(storage);
    let mut offset = from;
    while offset < to {
        let state = walker.state_at(offset)?;
        match state {
            RecordState::Unwritten => return Ok(offset),
            RecordState::AllocatedUncommitted { length } => {
                let (page, in_page) = walker.locate(offset)?;
                write_padding(page, in_page, length as usize)?;
                debug!(offset, length, "unfinished record turned into padding");
            }
            RecordState::CommittedData { .. } | RecordState::CommittedPadding { .. } => {}
        }
        offset = walker.next_offset(offset, state)?;
    }
    Ok(offset)
}

/// Counts committed data records in `[HEADER_SIZE, until)`.
pub(crate) fn count_committed_records(storage: &dyn PagedStorage, until: u64) -> LogResult<u32> {
    let mut walker = RecordWalker::new(storage);
    let mut offset = HEADER_SIZE;
    let mut count = 0u32;
    while offset < until {
        let state = walker.state_at(offset)?;
        match state {
            RecordState::Unwritten => break,
            RecordState::CommittedData { .. } => count = count.saturating_add(1),
            RecordState::AllocatedUncommitted { .. } | RecordState::CommittedPadding { .. } => {}
        }
        offset = walker.next_offset(offset, state)?;
    }
    Ok(count)
}

/// Recovers `[committed, allocated)` and leaves the header consistent.
///
/// Returns the new value of both cursors.
pub(crate) fn recover(
    storage: &dyn PagedStorage,
    header: &HeaderFields,
    committed: u64,
    allocated: u64,
) -> LogResult<u64> {
    let recovered_until = recover_region(storage, committed, allocated)?;

    let file_size = storage.actual_file_size()?;
    if file_size < recovered_until {
        return Err(LogError::invariant_violation(format!(
            "file size {file_size} is below the recovered offset {recovered_until}"
        )));
    }
    storage.zeroize_till_eof(recovered_until)?;

    header.set_committed_up_to(recovered_until)?;
    header.set_allocated_up_to(recovered_until)?;
    recount_records(storage, header, recovered_until)?;
    Ok(recovered_until)
}

/// Replaces the stored records count with a fresh scan.
pub(crate) fn recount_records(
    storage: &dyn PagedStorage,
    header: &HeaderFields,
    until: u64,
) -> LogResult<u32> {
    let count = count_committed_records(storage, until)?;
    header.set_records_count(count)?;
    Ok(count)
}
