//! Benchmark utilities.

use aolog_core::{AppendOnlyLog, LogConfig, RecordId};
use rand::Rng;
use std::path::Path;

/// Generate random payload data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` payloads with sizes drawn from `[0, max_size]`.
pub fn random_payloads(count: usize, max_size: usize) -> Vec<Vec<u8>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let size = rng.gen_range(0..=max_size);
            random_data(size)
        })
        .collect()
}

/// Opens a file log at `path` and fills it with `count` records of `size` bytes.
pub fn filled_log(path: &Path, page_size: u32, count: usize, size: usize) -> (AppendOnlyLog, Vec<RecordId>) {
    let log = AppendOnlyLog::open_with_config(path, LogConfig::default().page_size(page_size))
        .expect("Failed to open bench log");
    let data = random_data(size);
    let ids = (0..count)
        .map(|_| log.append(&data).expect("Failed to append"))
        .collect();
    (log, ids)
}
