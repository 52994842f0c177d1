//! Page handles over shared page memory.
//!
//! A [`Page`] is one fixed-size slice of the storage, handed out by
//! [`PagedStorage::page_by_offset`](crate::PagedStorage::page_by_offset).
//! Many threads hold the same page at once, so every field the log mutates
//! concurrently is accessed through atomic views constructed directly over
//! the page bytes: loads are `Acquire`, stores are `Release`, and
//! read-modify-write operations are `AcqRel`.
//!
//! Byte ranges are written with [`Page::store_bytes`] and copied out with
//! [`Page::load_bytes`], both made of 32-bit atomic accesses, so a reader
//! that lands on a range another thread is filling sees stale or fresh
//! words but never races. The `unsafe` [`Page::bytes`] view borrows a range
//! in place; its callers promise that nobody writes the range while the
//! view is alive.

use crate::error::{StorageError, StorageResult};
use memmap2::MmapMut;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{fence, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Memory backing a single page.
pub(crate) enum PageMemory {
    /// A mapping of one page-sized region of the backing file.
    Mapped(MmapMut),
    /// Heap memory, 8-byte aligned so 64-bit atomics work at offset 0.
    Heap(Vec<u64>),
}

/// A handle on one page of a [`PagedStorage`](crate::PagedStorage).
///
/// Pages are shared behind an `Arc`; the memory stays valid for as long as
/// any handle is alive, even after the storage that produced it was closed.
pub struct Page {
    page_no: u64,
    ptr: NonNull<u8>,
    len: usize,
    memory: PageMemory,
}

// SAFETY: the page memory is only ever reached through `ptr`. Every write
// is atomic, and the `unsafe` shared view requires that nobody writes the
// viewed range while it is alive. The backing (`MmapMut` or `Vec`) is
// owned and never resized, so `ptr` stays valid for the handle's lifetime.
unsafe impl Send for Page {}
// SAFETY: see `Send` above.
unsafe impl Sync for Page {}

impl Page {
    /// Wraps a mapped region as page `page_no`.
    pub(crate) fn mapped(page_no: u64, mut mmap: MmapMut) -> Self {
        let len = mmap.len();
        let ptr = NonNull::from(&mut mmap[..]).cast::<u8>();
        Self {
            page_no,
            ptr,
            len,
            memory: PageMemory::Mapped(mmap),
        }
    }

    /// Allocates a zero-filled heap page of `len` bytes.
    pub(crate) fn heap(page_no: u64, len: usize) -> Self {
        let mut words = vec![0u64; len.div_ceil(8)];
        let ptr = NonNull::from(&mut words[..]).cast::<u8>();
        Self {
            page_no,
            ptr,
            len,
            memory: PageMemory::Heap(words),
        }
    }

    /// Returns the page number (file offset divided by page size).
    #[must_use]
    pub fn page_no(&self) -> u64 {
        self.page_no
    }

    /// Returns the file offset of the first byte of this page.
    #[must_use]
    pub fn file_offset(&self) -> u64 {
        self.page_no * self.len as u64
    }

    /// Returns the page length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` for a zero-length page (never produced by the storages).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns whether this page is backed by a file mapping.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        matches!(self.memory, PageMemory::Mapped(_))
    }

    fn checked_ptr(&self, offset: usize, len: usize, alignment: usize) -> StorageResult<*mut u8> {
        let end = offset.checked_add(len).ok_or(StorageError::OutOfBounds {
            offset,
            len,
            size: self.len,
        })?;
        if end > self.len {
            return Err(StorageError::OutOfBounds {
                offset,
                len,
                size: self.len,
            });
        }
        // SAFETY: offset + len <= self.len, so the result stays inside the page.
        let ptr = unsafe { self.ptr.as_ptr().add(offset) };
        if (ptr as usize) % alignment != 0 {
            return Err(StorageError::Misaligned { offset, alignment });
        }
        Ok(ptr)
    }

    fn atomic_u32(&self, offset: usize) -> StorageResult<&AtomicU32> {
        let ptr = self.checked_ptr(offset, 4, 4)?;
        // SAFETY: in bounds and 4-byte aligned; the memory lives as long as `self`.
        Ok(unsafe { AtomicU32::from_ptr(ptr.cast()) })
    }

    fn atomic_u64(&self, offset: usize) -> StorageResult<&AtomicU64> {
        let ptr = self.checked_ptr(offset, 8, 8)?;
        // SAFETY: in bounds and 8-byte aligned; the memory lives as long as `self`.
        Ok(unsafe { AtomicU64::from_ptr(ptr.cast()) })
    }

    /// Loads a native-endian `u32` with `Acquire` ordering.
    pub fn load_u32(&self, offset: usize) -> StorageResult<u32> {
        Ok(self.atomic_u32(offset)?.load(Ordering::Acquire))
    }

    /// Stores a native-endian `u32` with `Release` ordering.
    pub fn store_u32(&self, offset: usize, value: u32) -> StorageResult<()> {
        self.atomic_u32(offset)?.store(value, Ordering::Release);
        Ok(())
    }

    /// Atomically adds `delta` to a `u32`, returning the previous value.
    pub fn fetch_add_u32(&self, offset: usize, delta: u32) -> StorageResult<u32> {
        Ok(self.atomic_u32(offset)?.fetch_add(delta, Ordering::AcqRel))
    }

    /// Loads a native-endian `u64` with `Acquire` ordering.
    pub fn load_u64(&self, offset: usize) -> StorageResult<u64> {
        Ok(self.atomic_u64(offset)?.load(Ordering::Acquire))
    }

    /// Stores a native-endian `u64` with `Release` ordering.
    pub fn store_u64(&self, offset: usize, value: u64) -> StorageResult<()> {
        self.atomic_u64(offset)?.store(value, Ordering::Release);
        Ok(())
    }

    /// Compare-and-swap on a `u64`. Returns `true` if `current` was replaced.
    pub fn compare_exchange_u64(&self, offset: usize, current: u64, new: u64) -> StorageResult<bool> {
        Ok(self
            .atomic_u64(offset)?
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    /// Zero-fills `len` bytes starting at `offset`.
    ///
    /// Uses atomic stores only, so it never races with concurrent atomic
    /// readers of the same range.
    pub fn zero_range(&self, offset: usize, len: usize) -> StorageResult<()> {
        let start = self.checked_ptr(offset, len, 1)?;
        let mut pos = 0usize;
        while pos < len {
            // SAFETY: pos < len and [start, start + len) is inside the page.
            let ptr = unsafe { start.add(pos) };
            if (ptr as usize) % 8 == 0 && len - pos >= 8 {
                // SAFETY: aligned, in bounds.
                unsafe { AtomicU64::from_ptr(ptr.cast()) }.store(0, Ordering::Relaxed);
                pos += 8;
            } else {
                // SAFETY: in bounds.
                unsafe { AtomicU8::from_ptr(ptr) }.store(0, Ordering::Relaxed);
                pos += 1;
            }
        }
        fence(Ordering::Release);
        Ok(())
    }

    /// Returns a shared view of `len` bytes at `offset`.
    ///
    /// # Safety
    ///
    /// No other thread may write to the range non-atomically while the
    /// returned slice is alive.
    pub unsafe fn bytes(&self, offset: usize, len: usize) -> StorageResult<&[u8]> {
        let ptr = self.checked_ptr(offset, len, 1)?;
        // SAFETY: in bounds; absence of concurrent writers is the caller's contract.
        Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
    }

    /// Copies `bytes` to `offset` with `Relaxed` 32-bit atomic stores.
    ///
    /// `offset` must be 4-byte aligned. The last word is padded with zeroes,
    /// so `bytes.len()` rounded up to 4 bytes are written. Publish the range
    /// to other threads with a later `Release` store.
    pub fn store_bytes(&self, offset: usize, bytes: &[u8]) -> StorageResult<()> {
        let start = self.checked_ptr(offset, bytes.len().div_ceil(4) * 4, 4)?;
        for (i, chunk) in bytes.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            // SAFETY: word i lies inside the checked, 4-byte aligned range.
            let atomic = unsafe { AtomicU32::from_ptr(start.add(i * 4).cast()) };
            atomic.store(u32::from_ne_bytes(word), Ordering::Relaxed);
        }
        Ok(())
    }

    /// Copies `len` bytes at `offset` out with 32-bit atomic loads.
    ///
    /// `offset` must be 4-byte aligned and `len` rounded up to 4 must stay
    /// inside the page. Safe to call on a range another thread is writing.
    pub fn load_bytes(&self, offset: usize, len: usize) -> StorageResult<Vec<u8>> {
        let words = len.div_ceil(4);
        let start = self.checked_ptr(offset, words * 4, 4)?;
        let mut out = Vec::with_capacity(words * 4);
        for i in 0..words {
            // SAFETY: word i lies inside the checked, 4-byte aligned range.
            let atomic = unsafe { AtomicU32::from_ptr(start.add(i * 4).cast()) };
            out.extend_from_slice(&atomic.load(Ordering::Relaxed).to_ne_bytes());
        }
        fence(Ordering::Acquire);
        out.truncate(len);
        Ok(out)
    }

    /// Flushes a mapped page to the file (`msync`). No-op for heap pages.
    pub fn flush(&self) -> StorageResult<()> {
        if let PageMemory::Mapped(mmap) = &self.memory {
            mmap.flush()?;
        }
        Ok(())
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("page_no", &self.page_no)
            .field("len", &self.len)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_page_is_zeroed() {
        let page = Page::heap(0, 64);
        assert_eq!(page.len(), 64);
        assert_eq!(page.load_u64(0).unwrap(), 0);
        assert_eq!(page.load_u32(60).unwrap(), 0);
    }

    #[test]
    fn u32_store_then_load() {
        let page = Page::heap(3, 32);
        page.store_u32(4, 0xDEAD_BEEF).unwrap();
        assert_eq!(page.load_u32(4).unwrap(), 0xDEAD_BEEF);
        assert_eq!(page.file_offset(), 96);
    }

    #[test]
    fn u64_compare_exchange() {
        let page = Page::heap(0, 32);
        page.store_u64(8, 64).unwrap();
        assert!(!page.compare_exchange_u64(8, 10, 20).unwrap());
        assert!(page.compare_exchange_u64(8, 64, 72).unwrap());
        assert_eq!(page.load_u64(8).unwrap(), 72);
    }

    #[test]
    fn fetch_add_returns_previous() {
        let page = Page::heap(0, 16);
        assert_eq!(page.fetch_add_u32(0, 3).unwrap(), 0);
        assert_eq!(page.fetch_add_u32(0, 2).unwrap(), 3);
        assert_eq!(page.load_u32(0).unwrap(), 5);
    }

    #[test]
    fn misaligned_atomic_rejected() {
        let page = Page::heap(0, 32);
        assert!(matches!(
            page.load_u32(2),
            Err(StorageError::Misaligned { alignment: 4, .. })
        ));
        assert!(matches!(
            page.load_u64(4),
            Err(StorageError::Misaligned { alignment: 8, .. })
        ));
    }

    #[test]
    fn out_of_bounds_rejected() {
        let page = Page::heap(0, 16);
        assert!(matches!(
            page.load_u32(16),
            Err(StorageError::OutOfBounds { .. })
        ));
        assert!(matches!(
            page.zero_range(8, 9),
            Err(StorageError::OutOfBounds { .. })
        ));
        assert!(matches!(
            page.load_u64(usize::MAX - 2),
            Err(StorageError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn zero_range_clears_unaligned_span() {
        let page = Page::heap(0, 32);
        for offset in (0..32).step_by(4) {
            page.store_u32(offset, u32::MAX).unwrap();
        }
        page.zero_range(3, 22).unwrap();

        let bytes = unsafe { page.bytes(0, 32).unwrap() };
        assert!(bytes[..3].iter().all(|&b| b == 0xFF));
        assert!(bytes[3..25].iter().all(|&b| b == 0));
        assert!(bytes[25..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn store_bytes_pads_last_word() {
        let page = Page::heap(0, 16);
        page.store_u32(12, u32::MAX).unwrap();
        page.store_bytes(4, b"abcde").unwrap();
        assert_eq!(unsafe { page.bytes(4, 5).unwrap() }, b"abcde");
        assert_eq!(page.load_bytes(4, 8).unwrap(), b"abcde\0\0\0");
        assert_eq!(page.load_u32(12).unwrap(), u32::MAX);
    }

    #[test]
    fn byte_copies_check_bounds_and_alignment() {
        let page = Page::heap(0, 16);
        assert!(matches!(
            page.store_bytes(2, b"ab"),
            Err(StorageError::Misaligned { alignment: 4, .. })
        ));
        assert!(matches!(
            page.load_bytes(12, 5),
            Err(StorageError::OutOfBounds { .. })
        ));
        page.store_bytes(16, b"").unwrap();
        assert!(page.load_bytes(16, 0).unwrap().is_empty());
    }
}
