//! Log configuration.

use crate::error::{LogError, LogResult};
use crate::log::record::LENGTH_MASK;
use crate::log::{HEADER_SIZE, RECORD_HEADER_SIZE};

/// Smallest page size a log accepts: the log header plus one record header.
pub const MIN_PAGE_SIZE: u32 = HEADER_SIZE as u32 + RECORD_HEADER_SIZE as u32;

/// Largest page size a log accepts. A padding record spanning a whole page
/// must still fit the 30-bit length field.
pub const MAX_PAGE_SIZE: u32 = LENGTH_MASK & !3;

/// Configuration for opening an append-only log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    /// Page size for a newly created storage. Must match on every reopen.
    pub page_size: u32,

    /// Whether to create the backing file if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to create missing parent directories.
    pub create_dirs: bool,

    /// Whether `flush_default()` and `close()` fsync.
    pub fsync_on_flush: bool,

    /// Whether read errors describe the recovery and close state.
    pub diagnostics: bool,

    /// Whether read errors carry a dump of the surrounding records.
    pub dump_on_error: bool,

    /// How many ids on each side of a failing id the dump covers.
    pub dump_region_width: u64,

    /// Dumped payloads are truncated after this many bytes.
    pub max_record_bytes_to_dump: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            page_size: 1024 * 1024, // 1 MiB
            create_if_missing: true,
            create_dirs: true,
            fsync_on_flush: false,
            diagnostics: true,
            dump_on_error: true,
            dump_region_width: 256,
            max_record_bytes_to_dump: 256,
        }
    }
}

impl LogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page size.
    #[must_use]
    pub const fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets whether to create the file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to create missing parent directories.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }

    /// Sets whether flushing fsyncs by default.
    #[must_use]
    pub const fn fsync_on_flush(mut self, value: bool) -> Self {
        self.fsync_on_flush = value;
        self
    }

    /// Sets whether read errors carry recovery diagnostics.
    #[must_use]
    pub const fn diagnostics(mut self, value: bool) -> Self {
        self.diagnostics = value;
        self
    }

    /// Sets whether read errors carry a content dump.
    #[must_use]
    pub const fn dump_on_error(mut self, value: bool) -> Self {
        self.dump_on_error = value;
        self
    }

    /// Sets the dump region width, in ids.
    #[must_use]
    pub const fn dump_region_width(mut self, width: u64) -> Self {
        self.dump_region_width = width;
        self
    }

    /// Sets the per-record dump truncation limit.
    #[must_use]
    pub const fn max_record_bytes_to_dump(mut self, bytes: usize) -> Self {
        self.max_record_bytes_to_dump = bytes;
        self
    }

    /// Checks that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the page size is not a multiple of 4 or
    /// lies outside [`MIN_PAGE_SIZE`]..=[`MAX_PAGE_SIZE`].
    pub fn validate(&self) -> LogResult<()> {
        validate_log_page_size(self.page_size)
    }
}

pub(crate) fn validate_log_page_size(page_size: u32) -> LogResult<()> {
    if page_size % 4 != 0 {
        return Err(LogError::invalid_argument(format!(
            "page size {page_size} must be 4-byte aligned"
        )));
    }
    if page_size < MIN_PAGE_SIZE {
        return Err(LogError::invalid_argument(format!(
            "page size {page_size} is smaller than the minimum of {MIN_PAGE_SIZE}"
        )));
    }
    if page_size > MAX_PAGE_SIZE {
        return Err(LogError::invalid_argument(format!(
            "page size {page_size} exceeds the maximum of {MAX_PAGE_SIZE}"
        )));
    }
    Ok(())
}
