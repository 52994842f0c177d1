//! # aolog Testkit
//!
//! Test utilities for aolog.
//!
//! This crate provides:
//! - Test fixtures that close, crash and reopen logs
//! - Crash simulation: abandoned appends, raw file tampering, scenarios
//! - Property-based test generators using proptest
//! - Multi-threaded stress harnesses
//!
//! ## Usage
//!
//! ```rust
//! use aolog_testkit::prelude::*;
//!
//! let mut test_log = TestLog::file(TEST_PAGE_SIZE);
//! let id = test_log.append(b"survives").unwrap();
//! let log = test_log.crash_and_reopen().unwrap();
//! assert_eq!(log.read_to_vec(id).unwrap(), b"survives");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
