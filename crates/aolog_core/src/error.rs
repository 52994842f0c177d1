//! Error types for aolog core.

use aolog_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur in append-only log operations.
#[derive(Debug, Error)]
pub enum LogError {
    /// Fault propagated from the paged storage (e.g. disk full while growing).
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),

    /// I/O error, typically returned by a caller-supplied payload writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file was written by an incompatible format or page size.
    #[error("incompatible log format: {message}")]
    FormatIncompatible {
        /// Description of the mismatch.
        message: String,
    },

    /// Payload plus record header does not fit in a page.
    #[error("payload of {len} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge {
        /// Requested payload length.
        len: usize,
        /// Largest payload the log accepts.
        max: usize,
    },

    /// The id does not address an allocated record.
    #[error("invalid record id {id}: {message}")]
    InvalidId {
        /// The rejected id.
        id: u64,
        /// Why it was rejected.
        message: String,
    },

    /// The id resolves to padding, an unfinished record, or a damaged header.
    #[error("record {id} is not committed or corrupted: {message}")]
    NotCommittedOrCorrupted {
        /// The requested id.
        id: u64,
        /// What was found at the record's offset.
        message: String,
    },

    /// The log has been closed.
    #[error("log is closed")]
    ClosedStorage,

    /// A structurally impossible header was met.
    #[error("log corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// An internal invariant did not hold.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },

    /// An argument or configuration value was rejected.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },
}

impl From<StorageError> for LogError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Closed => Self::ClosedStorage,
            other => Self::Storage(other),
        }
    }
}

impl LogError {
    /// Creates a format incompatibility error.
    pub fn format_incompatible(message: impl Into<String>) -> Self {
        Self::FormatIncompatible {
            message: message.into(),
        }
    }

    /// Creates an invalid id error.
    pub fn invalid_id(id: u64, message: impl Into<String>) -> Self {
        Self::InvalidId {
            id,
            message: message.into(),
        }
    }

    /// Creates a not-committed-or-corrupted error.
    pub fn not_committed(id: u64, message: impl Into<String>) -> Self {
        Self::NotCommittedOrCorrupted {
            id,
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns `true` if the error reports a closed log.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedStorage)
    }
}
