//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred (mapping, growing or syncing the file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An access fell outside the page it was addressed to.
    #[error("access out of page bounds: offset {offset}, len {len}, page size {size}")]
    OutOfBounds {
        /// The requested offset within the page.
        offset: usize,
        /// The requested access length.
        len: usize,
        /// The page size.
        size: usize,
    },

    /// An atomic access was not naturally aligned.
    #[error("misaligned atomic access: offset {offset} is not {alignment}-byte aligned")]
    Misaligned {
        /// The offset within the page.
        offset: usize,
        /// The required alignment in bytes.
        alignment: usize,
    },

    /// The requested page size cannot be used.
    #[error("invalid page size {page_size}: {reason}")]
    InvalidPageSize {
        /// The rejected page size.
        page_size: u32,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The storage is closed.
    #[error("storage is closed")]
    Closed,

    /// The operation would change a storage opened read-only.
    #[error("storage is read-only: {0}")]
    ReadOnly(String),
}
