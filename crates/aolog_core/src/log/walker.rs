//! Forward walking over record slots.

use crate::error::{LogError, LogResult};
use crate::log::record::{RecordState, RECORD_HEADER_SIZE};
use aolog_storage::{Page, PagedStorage};
use std::sync::Arc;

/// Resolves record offsets to pages, reusing the last page while the walk
/// stays on it.
pub(crate) struct RecordWalker<'a> {
    storage: &'a dyn PagedStorage,
    page_size: u64,
    page: Option<Arc<Page>>,
}

impl<'a> RecordWalker<'a> {
    pub(crate) fn new(storage: &'a dyn PagedStorage) -> Self {
        Self {
            storage,
            page_size: u64::from(storage.page_size()),
            page: None,
        }
    }

    /// Returns the page holding `offset` and the offset within it.
    pub(crate) fn locate(&mut self, offset: u64) -> LogResult<(&Page, usize)> {
        let page_no = offset / self.page_size;
        let cached = self
            .page
            .as_ref()
            .is_some_and(|page| page.page_no() == page_no);
        if !cached {
            self.page = Some(self.storage.page_by_offset(offset)?);
        }
        let in_page = self.storage.to_offset_in_page(offset);
        match self.page.as_deref() {
            Some(page) => Ok((page, in_page)),
            None => Err(LogError::invariant_violation("page cache is empty")),
        }
    }

    /// Loads and decodes the header at `offset`.
    pub(crate) fn state_at(&mut self, offset: u64) -> LogResult<RecordState> {
        let page_size = self.page_size;
        let (page, in_page) = self.locate(offset)?;
        if page_size - (in_page as u64) < RECORD_HEADER_SIZE as u64 {
            return Err(LogError::corrupted(format!(
                "record offset {offset} leaves less than a record header before the page end"
            )));
        }
        RecordState::decode(page.load_u32(in_page)?)
    }

    /// Returns the offset following the record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the record is unwritten or spans a page boundary.
    pub(crate) fn next_offset(&self, offset: u64, state: RecordState) -> LogResult<u64> {
        next_record_offset(offset, state, self.page_size)
    }
}

pub(crate) fn next_record_offset(offset: u64, state: RecordState, page_size: u64) -> LogResult<u64> {
    let length = state.record_length();
    if length == 0 {
        return Err(LogError::corrupted(format!(
            "cannot step over the unwritten slot at {offset}"
        )));
    }
    let in_page = offset % page_size;
    if in_page + length > page_size {
        return Err(LogError::corrupted(format!(
            "{} record at {offset} with length {} crosses the page boundary (page size {page_size})",
            state.name(),
            state.length()
        )));
    }
    Ok(offset + length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::record::{data_header, padding_header};
    use aolog_storage::InMemoryPagedStorage;

    #[test]
    fn steps_over_rounded_length() {
        let state = RecordState::CommittedData { length: 5 };
        assert_eq!(next_record_offset(64, state, 128).unwrap(), 72);
    }

    #[test]
    fn page_crossing_record_is_corrupted() {
        let state = RecordState::CommittedPadding { length: 16 };
        assert!(matches!(
            next_record_offset(120, state, 128),
            Err(LogError::Corrupted { .. })
        ));
        assert_eq!(next_record_offset(112, state, 128).unwrap(), 128);
    }

    #[test]
    fn unwritten_slot_cannot_be_stepped_over() {
        assert!(next_record_offset(64, RecordState::Unwritten, 128).is_err());
    }

    #[test]
    fn walker_reads_across_pages() {
        let storage = InMemoryPagedStorage::new(32).unwrap();
        storage
            .page_by_offset(8)
            .unwrap()
            .store_u32(8, data_header(2, true).unwrap())
            .unwrap();
        storage
            .page_by_offset(40)
            .unwrap()
            .store_u32(8, padding_header(24).unwrap())
            .unwrap();

        let mut walker = RecordWalker::new(&storage);
        let first = walker.state_at(8).unwrap();
        assert_eq!(first, RecordState::CommittedData { length: 6 });
        assert_eq!(walker.next_offset(8, first).unwrap(), 16);
        assert_eq!(walker.state_at(16).unwrap(), RecordState::Unwritten);

        let second = walker.state_at(40).unwrap();
        assert_eq!(second, RecordState::CommittedPadding { length: 24 });
        assert_eq!(walker.next_offset(40, second).unwrap(), 64);
    }
}
