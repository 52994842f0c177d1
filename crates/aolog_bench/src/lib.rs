//! Benchmark utilities for aolog.

#![warn(missing_docs)]

pub mod utils;
