//! Memory-mapped paged storage.

use crate::backend::{validate_page_size, PagedStorage};
use crate::error::{StorageError, StorageResult};
use crate::page::Page;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Options controlling how a [`MmapPagedStorage`] opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageOptions {
    /// Create the file if it does not exist.
    pub create_if_missing: bool,
    /// Create missing parent directories.
    pub create_dirs: bool,
    /// Open the file read-only. The file is never created, grown or
    /// written; page writes stay private to this process.
    pub read_only: bool,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            create_dirs: true,
            read_only: false,
        }
    }
}

impl StorageOptions {
    /// Sets whether a missing file is created.
    #[must_use]
    pub const fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets whether missing parent directories are created.
    #[must_use]
    pub const fn create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }

    /// Sets whether the file is opened read-only.
    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

#[derive(Debug)]
struct MmapState {
    file: Option<File>,
    pages: Vec<Option<Arc<Page>>>,
}

/// A paged storage over a memory-mapped file.
///
/// Each page is mapped separately (`MAP_SHARED`, read-write) the first time
/// it is requested and cached for the lifetime of the storage. Requesting a
/// page past the end of the file grows the file to cover it; the new region
/// reads as zeroes.
///
/// A storage opened with [`StorageOptions::read_only`] maps pages
/// copy-on-write instead. A last page cut short by the end of the file is
/// read into heap memory, and pages starting past the end are refused.
///
/// # Durability
///
/// Writes land in the OS page cache as soon as they are made. They survive a
/// process crash without any flush; [`fsync`](PagedStorage::fsync) is only
/// needed to survive an OS crash or power loss.
///
/// # Example
///
/// ```no_run
/// use aolog_storage::{MmapPagedStorage, PagedStorage};
/// use std::path::Path;
///
/// let storage = MmapPagedStorage::open(Path::new("data.log"), 4096).unwrap();
/// let page = storage.page_by_offset(8192).unwrap();
/// page.store_u32(0, 42).unwrap();
/// storage.fsync().unwrap();
/// ```
#[derive(Debug)]
pub struct MmapPagedStorage {
    path: PathBuf,
    page_size: u32,
    read_only: bool,
    state: RwLock<MmapState>,
}

impl MmapPagedStorage {
    /// Opens or creates a mapped storage with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size is invalid or the file cannot be opened.
    pub fn open(path: &Path, page_size: u32) -> StorageResult<Self> {
        Self::open_with_options(path, page_size, StorageOptions::default())
    }

    /// Opens a mapped storage with explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if the page size is invalid, directories cannot be
    /// created, or the file cannot be opened.
    pub fn open_with_options(
        path: &Path,
        page_size: u32,
        options: StorageOptions,
    ) -> StorageResult<Self> {
        validate_page_size(page_size)?;

        if options.create_dirs && !options.read_only {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let file = if options.read_only {
            File::open(path)?
        } else {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(options.create_if_missing)
                .truncate(false)
                .open(path)?
        };

        Ok(Self {
            path: path.to_path_buf(),
            page_size,
            read_only: options.read_only,
            state: RwLock::new(MmapState {
                file: Some(file),
                pages: Vec::new(),
            }),
        })
    }

    /// Returns the number of pages mapped so far.
    #[must_use]
    pub fn mapped_pages(&self) -> usize {
        self.state.read().pages.iter().flatten().count()
    }

    /// Returns `true` if the file was opened read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn map_page(&self, file: &File, page_no: u64) -> StorageResult<Page> {
        let page_size = u64::from(self.page_size);
        let page_start = page_no
            .checked_mul(page_size)
            .ok_or_else(|| offset_overflow(page_no))?;
        let page_end = page_start
            .checked_add(page_size)
            .ok_or_else(|| offset_overflow(page_no))?;

        let file_len = file.metadata()?.len();
        if self.read_only {
            return self.map_page_read_only(file, page_no, page_start, file_len);
        }
        if file_len < page_end {
            file.set_len(page_end)?;
        }

        // SAFETY: the mapping is shared with other processes that may open the
        // same file. Every access goes through `Page`, which only performs
        // atomic operations or hands out views under a caller-checked contract,
        // and the file is never shrunk while mapped.
        let mmap = unsafe {
            memmap2::MmapOptions::new()
                .offset(page_start)
                .len(self.page_size as usize)
                .map_mut(file)?
        };
        Ok(Page::mapped(page_no, mmap))
    }

    fn map_page_read_only(
        &self,
        mut file: &File,
        page_no: u64,
        page_start: u64,
        file_len: u64,
    ) -> StorageResult<Page> {
        if page_start >= file_len {
            return Err(StorageError::ReadOnly(format!(
                "page {page_no} starts at {page_start}, past the end of the {file_len}-byte file"
            )));
        }
        let available = file_len - page_start;
        if available < u64::from(self.page_size) {
            // Mapping past the end of the file would fault on access.
            let mut buf = vec![0u8; available as usize];
            file.seek(SeekFrom::Start(page_start))?;
            file.read_exact(&mut buf)?;
            let page = Page::heap(page_no, self.page_size as usize);
            page.store_bytes(0, &buf)?;
            return Ok(page);
        }

        // SAFETY: a private mapping; writes through it never reach the file.
        // Other processes may still change the file, which `Page` tolerates
        // as it does for shared mappings.
        let mmap = unsafe {
            memmap2::MmapOptions::new()
                .offset(page_start)
                .len(self.page_size as usize)
                .map_copy(file)?
        };
        Ok(Page::mapped(page_no, mmap))
    }
}

fn offset_overflow(page_no: u64) -> StorageError {
    StorageError::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("page {page_no} is beyond the addressable range"),
    ))
}

impl PagedStorage for MmapPagedStorage {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn page_by_offset(&self, offset: u64) -> StorageResult<Arc<Page>> {
        let page_no = offset / u64::from(self.page_size);
        let index = usize::try_from(page_no).map_err(|_| offset_overflow(page_no))?;

        {
            let state = self.state.read();
            if state.file.is_none() {
                return Err(StorageError::Closed);
            }
            if let Some(Some(page)) = state.pages.get(index) {
                return Ok(Arc::clone(page));
            }
        }

        let mut state = self.state.write();
        if let Some(Some(page)) = state.pages.get(index) {
            return Ok(Arc::clone(page));
        }
        let page = {
            let file = state.file.as_ref().ok_or(StorageError::Closed)?;
            Arc::new(self.map_page(file, page_no)?)
        };
        if state.pages.len() <= index {
            state.pages.resize(index + 1, None);
        }
        state.pages[index] = Some(Arc::clone(&page));
        Ok(page)
    }

    fn actual_file_size(&self) -> StorageResult<u64> {
        let state = self.state.read();
        let file = state.file.as_ref().ok_or(StorageError::Closed)?;
        Ok(file.metadata()?.len())
    }

    fn fsync(&self) -> StorageResult<()> {
        let state = self.state.read();
        let file = state.file.as_ref().ok_or(StorageError::Closed)?;
        if self.read_only {
            return Ok(());
        }
        for page in state.pages.iter().flatten() {
            page.flush()?;
        }
        file.sync_all()?;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.read().file.is_some()
    }

    fn close(&self) -> StorageResult<()> {
        let mut state = self.state.write();
        state.pages.clear();
        state.file = None;
        Ok(())
    }

    fn close_and_clean(&self) -> StorageResult<()> {
        if self.read_only {
            return Err(StorageError::ReadOnly(format!(
                "refusing to remove {}",
                self.path.display()
            )));
        }
        self.close()?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn storage_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pages.bin");
        let storage = MmapPagedStorage::open(&path, 4096).unwrap();

        assert!(path.exists());
        assert!(storage.is_open());
        assert_eq!(storage.actual_file_size().unwrap(), 0);
        assert_eq!(storage.storage_path(), Some(path.as_path()));
    }

    #[test]
    fn open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("pages.bin");
        let _storage = MmapPagedStorage::open(&path, 4096).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn open_missing_without_create_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        let options = StorageOptions::default().create_if_missing(false);
        let result = MmapPagedStorage::open_with_options(&path, 4096, options);
        assert!(matches!(result, Err(StorageError::Io(_))));
    }

    #[test]
    fn invalid_page_size_rejected() {
        let dir = tempdir().unwrap();
        let result = MmapPagedStorage::open(&dir.path().join("x.bin"), 4095);
        assert!(matches!(result, Err(StorageError::InvalidPageSize { .. })));
    }

    #[test]
    fn page_request_grows_file() {
        let dir = tempdir().unwrap();
        let storage = MmapPagedStorage::open(&dir.path().join("g.bin"), 4096).unwrap();

        let page = storage.page_by_offset(3 * 4096 + 10).unwrap();
        assert_eq!(page.page_no(), 3);
        assert_eq!(page.file_offset(), 3 * 4096);
        assert_eq!(storage.actual_file_size().unwrap(), 4 * 4096);
        assert_eq!(storage.to_offset_in_page(3 * 4096 + 10), 10);
    }

    #[test]
    fn same_page_is_cached() {
        let dir = tempdir().unwrap();
        let storage = MmapPagedStorage::open(&dir.path().join("c.bin"), 4096).unwrap();

        let a = storage.page_by_offset(100).unwrap();
        let b = storage.page_by_offset(4000).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(storage.mapped_pages(), 1);
    }

    #[test]
    fn small_unaligned_pages_work() {
        let dir = tempdir().unwrap();
        let storage = MmapPagedStorage::open(&dir.path().join("s.bin"), 76).unwrap();

        let page = storage.page_by_offset(80).unwrap();
        page.store_u32(4, 7).unwrap();
        assert_eq!(page.load_u32(4).unwrap(), 7);
        assert_eq!(storage.actual_file_size().unwrap(), 152);
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.bin");

        {
            let storage = MmapPagedStorage::open(&path, 4096).unwrap();
            let page = storage.page_by_offset(4096).unwrap();
            page.store_u64(8, 0x0123_4567_89AB_CDEF).unwrap();
            storage.fsync().unwrap();
            storage.close().unwrap();
        }

        let storage = MmapPagedStorage::open(&path, 4096).unwrap();
        let page = storage.page_by_offset(4096).unwrap();
        assert_eq!(page.load_u64(8).unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn zeroize_till_eof_clears_tail() {
        let dir = tempdir().unwrap();
        let storage = MmapPagedStorage::open(&dir.path().join("z.bin"), 64).unwrap();

        for offset in (0..256u64).step_by(4) {
            let page = storage.page_by_offset(offset).unwrap();
            page.store_u32(storage.to_offset_in_page(offset), 0xFFFF_FFFF)
                .unwrap();
        }
        storage.zeroize_till_eof(100).unwrap();

        for offset in (0..256u64).step_by(4) {
            let page = storage.page_by_offset(offset).unwrap();
            let value = page.load_u32(storage.to_offset_in_page(offset)).unwrap();
            if offset < 100 {
                assert_eq!(value, 0xFFFF_FFFF, "offset {offset}");
            } else {
                assert_eq!(value, 0, "offset {offset}");
            }
        }
    }

    #[test]
    fn closed_storage_rejects_pages() {
        let dir = tempdir().unwrap();
        let storage = MmapPagedStorage::open(&dir.path().join("cl.bin"), 4096).unwrap();
        let page = storage.page_by_offset(0).unwrap();

        storage.close().unwrap();
        storage.close().unwrap();
        assert!(!storage.is_open());
        assert!(matches!(
            storage.page_by_offset(0),
            Err(StorageError::Closed)
        ));
        assert!(matches!(storage.fsync(), Err(StorageError::Closed)));

        // Outstanding handles stay usable.
        page.store_u32(0, 1).unwrap();
        assert_eq!(page.load_u32(0).unwrap(), 1);
    }

    #[test]
    fn close_and_clean_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rm.bin");
        let storage = MmapPagedStorage::open(&path, 4096).unwrap();
        storage.page_by_offset(0).unwrap();

        storage.close_and_clean().unwrap();
        assert!(!path.exists());
        storage.close_and_clean().unwrap();
    }

    #[test]
    fn read_only_never_changes_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.bin");
        let mut contents: Vec<u8> = (0..100u8).collect();
        contents.extend_from_slice(&[0xEE; 4]);
        fs::write(&path, &contents).unwrap();

        let options = StorageOptions::default().read_only(true);
        let storage = MmapPagedStorage::open_with_options(&path, 64, options).unwrap();
        assert!(storage.is_read_only());

        // A full page is mapped copy-on-write.
        let first = storage.page_by_offset(0).unwrap();
        assert!(first.is_mapped());
        assert_eq!(first.load_u32(8).unwrap(), u32::from_ne_bytes([8, 9, 10, 11]));
        first.store_u32(8, 0).unwrap();

        // The partial last page is read into memory.
        let last = storage.page_by_offset(64).unwrap();
        assert!(!last.is_mapped());
        assert_eq!(last.load_bytes(32, 8).unwrap(), [96, 97, 98, 99, 0xEE, 0xEE, 0xEE, 0xEE]);
        assert_eq!(last.load_u32(40).unwrap(), 0);
        last.store_u32(0, 0).unwrap();

        assert!(matches!(
            storage.page_by_offset(128),
            Err(StorageError::ReadOnly(_))
        ));
        storage.fsync().unwrap();
        assert!(matches!(
            storage.close_and_clean(),
            Err(StorageError::ReadOnly(_))
        ));
        storage.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), contents);
    }

    #[test]
    fn read_only_does_not_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.bin");
        let options = StorageOptions::default().read_only(true);
        assert!(MmapPagedStorage::open_with_options(&path, 64, options).is_err());
        assert!(!path.exists());
    }
}
