//! Test fixtures and log helpers.
//!
//! A [`TestLog`] owns an open log plus whatever backs it (a temporary
//! directory or a shared in-memory storage), and can close, crash and
//! reopen it without losing the content.

use aolog_core::{AppendOnlyLog, LogConfig, LogResult};
use aolog_storage::{InMemoryPagedStorage, PagedStorage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Default page size for test logs: small, so tests cross pages quickly.
pub const TEST_PAGE_SIZE: u32 = 256;

enum Backing {
    File { _dir: TempDir, path: PathBuf },
    Memory(Arc<InMemoryPagedStorage>),
}

/// A test log with automatic cleanup.
pub struct TestLog {
    log: Option<AppendOnlyLog>,
    backing: Backing,
    config: LogConfig,
}

impl TestLog {
    /// Creates a file-backed log in a fresh temporary directory.
    pub fn file(page_size: u32) -> Self {
        Self::file_with_config(LogConfig::default().page_size(page_size))
    }

    /// Creates a file-backed log with a custom configuration.
    pub fn file_with_config(config: LogConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("test.aolog");
        let backing = Backing::File { _dir: dir, path };
        let log = open_backing(&backing, config).expect("Failed to open file log");
        Self {
            log: Some(log),
            backing,
            config,
        }
    }

    /// Creates a log over a shared in-memory storage that survives reopen.
    pub fn memory(page_size: u32) -> Self {
        let config = LogConfig::default().page_size(page_size);
        let storage =
            Arc::new(InMemoryPagedStorage::new(page_size).expect("Failed to create memory storage"));
        let backing = Backing::Memory(storage);
        let log = open_backing(&backing, config).expect("Failed to open memory log");
        Self {
            log: Some(log),
            backing,
            config,
        }
    }

    /// Returns the open log.
    ///
    /// # Panics
    ///
    /// Panics if the log was taken out with [`take`](Self::take).
    pub fn log(&self) -> &AppendOnlyLog {
        self.log.as_ref().expect("test log is not open")
    }

    /// Takes the open log out of the fixture, e.g. to crash it.
    ///
    /// Call [`reopen_after_crash`](Self::reopen_after_crash) afterwards.
    pub fn take(&mut self) -> Option<AppendOnlyLog> {
        self.log.take()
    }

    /// Returns the log file path, `None` for in-memory logs.
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::File { path, .. } => Some(path),
            Backing::Memory(_) => None,
        }
    }

    /// Returns the configuration the log is opened with.
    pub fn config(&self) -> LogConfig {
        self.config
    }

    /// Closes the log properly and opens it again.
    pub fn reopen(&mut self) -> LogResult<&AppendOnlyLog> {
        if let Some(log) = self.log.take() {
            log.close()?;
        }
        if let Backing::Memory(storage) = &self.backing {
            storage.reopen();
        }
        self.open_again()
    }

    /// Abandons the log as a dying process would and opens it again.
    pub fn crash_and_reopen(&mut self) -> LogResult<&AppendOnlyLog> {
        if let Some(log) = self.log.take() {
            crate::crash::simulate_process_death(log);
        }
        self.reopen_after_crash()
    }

    /// Opens the log again after it was taken out and crashed.
    pub fn reopen_after_crash(&mut self) -> LogResult<&AppendOnlyLog> {
        if let Backing::Memory(storage) = &self.backing {
            // A crashed in-memory log never closed its storage.
            storage.reopen();
        }
        self.open_again()
    }

    fn open_again(&mut self) -> LogResult<&AppendOnlyLog> {
        let log = open_backing(&self.backing, self.config)?;
        Ok(self.log.insert(log))
    }
}

fn open_backing(backing: &Backing, config: LogConfig) -> LogResult<AppendOnlyLog> {
    match backing {
        Backing::File { path, .. } => AppendOnlyLog::open_with_config(path, config),
        Backing::Memory(storage) => {
            let storage: Box<dyn PagedStorage> = Box::new(Arc::clone(storage));
            AppendOnlyLog::open_with_storage(storage, config)
        }
    }
}

impl std::ops::Deref for TestLog {
    type Target = AppendOnlyLog;

    fn deref(&self) -> &Self::Target {
        self.log()
    }
}

/// Runs a test with a temporary in-memory log.
///
/// # Example
///
/// ```rust
/// use aolog_testkit::with_temp_log;
///
/// with_temp_log(|log| {
///     let id = log.append(b"x").unwrap();
///     assert_eq!(log.read_to_vec(id).unwrap(), b"x");
/// });
/// ```
pub fn with_temp_log<F, R>(f: F) -> R
where
    F: FnOnce(&AppendOnlyLog) -> R,
{
    let test_log = TestLog::memory(TEST_PAGE_SIZE);
    f(test_log.log())
}

/// Runs a test with a temporary file-backed log.
pub fn with_file_log<F, R>(f: F) -> R
where
    F: FnOnce(&AppendOnlyLog, &Path) -> R,
{
    let test_log = TestLog::file(TEST_PAGE_SIZE);
    let path = test_log.path().expect("File log should have a path");
    f(test_log.log(), path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use aolog_core::RecordId;

    /// Deterministic payload for record number `index`.
    pub fn payload_for(index: usize, len: usize) -> Vec<u8> {
        (0..len).map(|i| (index * 31 + i) as u8).collect()
    }

    /// Creates a file log holding `count` records of `payload_len` bytes.
    pub fn populated_log(count: usize, payload_len: usize) -> (TestLog, Vec<RecordId>) {
        let test_log = TestLog::file(TEST_PAGE_SIZE);
        let ids = (0..count)
            .map(|i| {
                test_log
                    .append(&payload_for(i, payload_len))
                    .expect("Failed to append")
            })
            .collect();
        (test_log, ids)
    }
}
