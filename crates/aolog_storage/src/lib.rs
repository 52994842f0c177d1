//! # aolog storage
//!
//! Paged storage for the aolog append-only log.
//!
//! This crate provides the lowest layer of aolog: a file (or a block of heap
//! memory) divided into fixed-size pages, each exposed as a shared [`Page`]
//! handle with atomic accessors. Storages are **format-agnostic** - they do
//! not know about log headers or records.
//!
//! ## Design Principles
//!
//! - Pages are addressed by absolute offset and created on first use
//! - All concurrent mutation goes through acquire/release atomics
//! - Page handles outlive the storage that produced them
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Storages
//!
//! - [`MmapPagedStorage`] - memory-mapped file, one mapping per page
//! - [`InMemoryPagedStorage`] - heap pages, for testing
//!
//! ## Example
//!
//! ```rust
//! use aolog_storage::{InMemoryPagedStorage, PagedStorage};
//!
//! let storage = InMemoryPagedStorage::new(4096).unwrap();
//! let page = storage.page_by_offset(8).unwrap();
//! page.store_u64(8, 42).unwrap();
//! assert_eq!(page.load_u64(8).unwrap(), 42);
//! ```

#![warn(missing_docs)]

mod backend;
mod error;
mod memory;
mod mmap;
mod page;

pub use backend::{validate_page_size, PagedStorage, MIN_PAGE_SIZE};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryPagedStorage;
pub use mmap::{MmapPagedStorage, StorageOptions};
pub use page::Page;
