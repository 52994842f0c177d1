//! Paged storage trait definition.

use crate::error::StorageResult;
use crate::page::Page;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Smallest accepted page size in bytes.
pub const MIN_PAGE_SIZE: u32 = 8;

/// Checks that `page_size` can be used by a paged storage.
///
/// A page size must be non-zero and a multiple of 4, so that 32-bit atomic
/// fields never straddle a page boundary.
///
/// # Errors
///
/// Returns [`StorageError::InvalidPageSize`](crate::StorageError::InvalidPageSize)
/// if the size is rejected.
pub fn validate_page_size(page_size: u32) -> StorageResult<()> {
    use crate::error::StorageError;

    if page_size < MIN_PAGE_SIZE {
        return Err(StorageError::InvalidPageSize {
            page_size,
            reason: "page size is too small",
        });
    }
    if page_size % 4 != 0 {
        return Err(StorageError::InvalidPageSize {
            page_size,
            reason: "page size must be a multiple of 4",
        });
    }
    Ok(())
}

/// A storage divided into fixed-size pages, addressed by absolute offset.
///
/// Storages know nothing about the data they hold. The log built on top of
/// them owns all format interpretation; a storage only hands out [`Page`]
/// handles and manages the underlying file.
///
/// # Invariants
///
/// - Every page is exactly [`page_size`](Self::page_size) bytes long
/// - `page_by_offset` returns the page containing `offset`, growing the
///   storage if the page does not exist yet
/// - Newly grown pages read as zeroes
/// - Implementations must be `Send + Sync`: pages are requested concurrently
///
/// # Implementors
///
/// - [`super::MmapPagedStorage`] - a memory-mapped file
/// - [`super::InMemoryPagedStorage`] - heap pages, for testing
/// - `Arc<S>` for any `S: PagedStorage` - one storage shared by several owners
pub trait PagedStorage: Send + Sync + fmt::Debug {
    /// Returns the page size in bytes.
    fn page_size(&self) -> u32;

    /// Returns the page containing `offset`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage is closed or cannot be grown.
    fn page_by_offset(&self, offset: u64) -> StorageResult<Arc<Page>>;

    /// Converts an absolute offset into an offset within its page.
    fn to_offset_in_page(&self, offset: u64) -> usize {
        (offset % u64::from(self.page_size())) as usize
    }

    /// Returns the current size of the backing file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage is closed or the size cannot be read.
    fn actual_file_size(&self) -> StorageResult<u64>;

    /// Zero-fills everything from `offset` to the end of the storage.
    ///
    /// # Errors
    ///
    /// Returns an error if a page cannot be obtained.
    fn zeroize_till_eof(&self, offset: u64) -> StorageResult<()> {
        let file_size = self.actual_file_size()?;
        let page_size = u64::from(self.page_size());
        let mut pos = offset;
        while pos < file_size {
            let page = self.page_by_offset(pos)?;
            let in_page = self.to_offset_in_page(pos);
            let len = page.len() - in_page;
            page.zero_range(in_page, len)?;
            pos += page_size - in_page as u64;
        }
        Ok(())
    }

    /// Forces all pages and file metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails or the storage is closed.
    fn fsync(&self) -> StorageResult<()>;

    /// Returns `true` until the storage is closed.
    fn is_open(&self) -> bool;

    /// Closes the storage. Page handles already given out stay valid.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing the file fails.
    fn close(&self) -> StorageResult<()>;

    /// Closes the storage and releases its own references to every mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing the file fails.
    fn close_and_unmap(&self) -> StorageResult<()> {
        self.close()
    }

    /// Closes the storage and deletes its backing file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed.
    fn close_and_clean(&self) -> StorageResult<()>;

    /// Returns the path of the backing file, or `None` for in-memory storage.
    fn storage_path(&self) -> Option<&Path>;
}

impl<S: PagedStorage + ?Sized> PagedStorage for Arc<S> {
    fn page_size(&self) -> u32 {
        (**self).page_size()
    }

    fn page_by_offset(&self, offset: u64) -> StorageResult<Arc<Page>> {
        (**self).page_by_offset(offset)
    }

    fn to_offset_in_page(&self, offset: u64) -> usize {
        (**self).to_offset_in_page(offset)
    }

    fn actual_file_size(&self) -> StorageResult<u64> {
        (**self).actual_file_size()
    }

    fn zeroize_till_eof(&self, offset: u64) -> StorageResult<()> {
        (**self).zeroize_till_eof(offset)
    }

    fn fsync(&self) -> StorageResult<()> {
        (**self).fsync()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&self) -> StorageResult<()> {
        (**self).close()
    }

    fn close_and_unmap(&self) -> StorageResult<()> {
        (**self).close_and_unmap()
    }

    fn close_and_clean(&self) -> StorageResult<()> {
        (**self).close_and_clean()
    }

    fn storage_path(&self) -> Option<&Path> {
        (**self).storage_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn page_size_validation() {
        assert!(validate_page_size(4096).is_ok());
        assert!(validate_page_size(76).is_ok());
        assert!(matches!(
            validate_page_size(0),
            Err(StorageError::InvalidPageSize { .. })
        ));
        assert!(matches!(
            validate_page_size(4098),
            Err(StorageError::InvalidPageSize { .. })
        ));
    }
}
