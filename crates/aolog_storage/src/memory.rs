//! In-memory paged storage for testing.

use crate::backend::{validate_page_size, PagedStorage};
use crate::error::{StorageError, StorageResult};
use crate::page::Page;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
struct MemoryState {
    open: bool,
    pages: Vec<Arc<Page>>,
}

/// A paged storage backed by heap memory.
///
/// Behaves like [`MmapPagedStorage`](crate::MmapPagedStorage) except that
/// nothing is persisted: pages are zero-filled heap buffers and `fsync` is a
/// no-op. A plain `close` keeps the pages so the storage can be
/// [`reopen`](Self::reopen)ed, which is how tests simulate a restart.
/// `close_and_unmap` and `close_and_clean` drop the content.
///
/// # Example
///
/// ```rust
/// use aolog_storage::{InMemoryPagedStorage, PagedStorage};
///
/// let storage = InMemoryPagedStorage::new(4096).unwrap();
/// let page = storage.page_by_offset(100).unwrap();
/// page.store_u32(100, 0xAB).unwrap();
/// assert_eq!(storage.actual_file_size().unwrap(), 4096);
/// ```
#[derive(Debug)]
pub struct InMemoryPagedStorage {
    page_size: u32,
    state: RwLock<MemoryState>,
}

impl InMemoryPagedStorage {
    /// Creates an empty in-memory storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size is invalid.
    pub fn new(page_size: u32) -> StorageResult<Self> {
        validate_page_size(page_size)?;
        Ok(Self {
            page_size,
            state: RwLock::new(MemoryState {
                open: true,
                pages: Vec::new(),
            }),
        })
    }

    /// Reopens a closed storage with its content intact.
    pub fn reopen(&self) {
        self.state.write().open = true;
    }

    /// Returns the number of allocated pages.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.read().pages.len()
    }
}

impl PagedStorage for InMemoryPagedStorage {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn page_by_offset(&self, offset: u64) -> StorageResult<Arc<Page>> {
        let page_no = offset / u64::from(self.page_size);
        let index = usize::try_from(page_no).map_err(|_| StorageError::OutOfBounds {
            offset: usize::MAX,
            len: 0,
            size: self.page_size as usize,
        })?;

        {
            let state = self.state.read();
            if !state.open {
                return Err(StorageError::Closed);
            }
            if let Some(page) = state.pages.get(index) {
                return Ok(Arc::clone(page));
            }
        }

        let mut state = self.state.write();
        if !state.open {
            return Err(StorageError::Closed);
        }
        while state.pages.len() <= index {
            let next = state.pages.len() as u64;
            state
                .pages
                .push(Arc::new(Page::heap(next, self.page_size as usize)));
        }
        Ok(Arc::clone(&state.pages[index]))
    }

    fn actual_file_size(&self) -> StorageResult<u64> {
        let state = self.state.read();
        if !state.open {
            return Err(StorageError::Closed);
        }
        Ok(state.pages.len() as u64 * u64::from(self.page_size))
    }

    fn fsync(&self) -> StorageResult<()> {
        if self.state.read().open {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }

    fn is_open(&self) -> bool {
        self.state.read().open
    }

    fn close(&self) -> StorageResult<()> {
        self.state.write().open = false;
        Ok(())
    }

    fn close_and_unmap(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        state.open = false;
        state.pages.clear();
        Ok(())
    }

    fn close_and_clean(&self) -> StorageResult<()> {
        self.close_and_unmap()
    }

    fn storage_path(&self) -> Option<&Path> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let storage = InMemoryPagedStorage::new(128).unwrap();
        assert_eq!(storage.page_count(), 0);
        assert_eq!(storage.actual_file_size().unwrap(), 0);
        assert!(storage.storage_path().is_none());
    }

    #[test]
    fn memory_grows_through_requested_page() {
        let storage = InMemoryPagedStorage::new(128).unwrap();
        let page = storage.page_by_offset(300).unwrap();
        assert_eq!(page.page_no(), 2);
        assert_eq!(storage.page_count(), 3);
        assert_eq!(storage.actual_file_size().unwrap(), 384);
    }

    #[test]
    fn memory_pages_are_shared() {
        let storage = InMemoryPagedStorage::new(128).unwrap();
        let a = storage.page_by_offset(0).unwrap();
        a.store_u64(0, 99).unwrap();
        let b = storage.page_by_offset(64).unwrap();
        assert_eq!(b.load_u64(0).unwrap(), 99);
    }

    #[test]
    fn memory_zeroize_till_eof() {
        let storage = InMemoryPagedStorage::new(16).unwrap();
        for offset in (0..48u64).step_by(4) {
            storage
                .page_by_offset(offset)
                .unwrap()
                .store_u32(storage.to_offset_in_page(offset), 5)
                .unwrap();
        }
        storage.zeroize_till_eof(20).unwrap();

        let first = storage.page_by_offset(16).unwrap();
        assert_eq!(first.load_u32(0).unwrap(), 5);
        assert_eq!(first.load_u32(4).unwrap(), 0);
        assert_eq!(storage.page_by_offset(40).unwrap().load_u32(8).unwrap(), 0);
    }

    #[test]
    fn memory_close() {
        let storage = InMemoryPagedStorage::new(16).unwrap();
        storage.page_by_offset(0).unwrap();
        storage.close().unwrap();
        assert!(!storage.is_open());
        assert!(matches!(
            storage.page_by_offset(0),
            Err(StorageError::Closed)
        ));
        assert!(matches!(storage.fsync(), Err(StorageError::Closed)));
    }

    #[test]
    fn memory_reopen_keeps_content() {
        let storage = InMemoryPagedStorage::new(16).unwrap();
        storage.page_by_offset(0).unwrap().store_u32(4, 42).unwrap();
        storage.close().unwrap();

        storage.reopen();
        assert!(storage.is_open());
        assert_eq!(storage.page_by_offset(0).unwrap().load_u32(4).unwrap(), 42);

        storage.close_and_clean().unwrap();
        storage.reopen();
        assert_eq!(storage.page_count(), 0);
    }
}
