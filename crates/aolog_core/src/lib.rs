//! # aolog core
//!
//! A lock-free, append-only record log built directly over a memory-mapped,
//! page-structured file.
//!
//! This crate provides:
//! - [`AppendOnlyLog`]: append, read by id, iterate, with crash recovery
//! - Record and header codecs for the on-disk format
//! - Read-only scanning and verification for tooling
//!
//! ## Example
//!
//! ```rust
//! use aolog_core::AppendOnlyLog;
//!
//! let log = AppendOnlyLog::open_in_memory(4096).unwrap();
//! let id = log.append(b"hello").unwrap();
//! let value = log.read(id, |payload| payload.to_vec()).unwrap();
//! assert_eq!(value, b"hello");
//! assert_eq!(log.records_count().unwrap(), 1);
//! ```

#![warn(missing_docs)]

mod config;
mod error;
pub mod log;
mod types;

pub use config::{LogConfig, MAX_PAGE_SIZE, MIN_PAGE_SIZE};
pub use error::{LogError, LogResult};
pub use log::{
    check_file_params_compatible, to_hex, verify_storage, AppendOnlyLog, HeaderSnapshot,
    RecordScanner, RecordState, ScannedRecord, VerifyReport, HEADER_SIZE, IMPLEMENTATION_VERSION,
    MAGIC, RECORD_HEADER_SIZE, USER_FIELDS,
};
pub use types::RecordId;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
