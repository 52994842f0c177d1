//! Stress tests for append-only logs.
//!
//! These harnesses hammer one log from many threads and check that every
//! append got a distinct id and stays readable with its own payload, and
//! that reads racing the writers never return bytes of another record.

use crate::fixtures::scenarios::payload_for;
use aolog_core::{AppendOnlyLog, LogError, RecordId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
    /// Invariant violations found while checking the outcome.
    pub violations: Vec<String>,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
            violations: Vec::new(),
        }
    }

    /// Returns `true` if nothing failed and no invariant was violated.
    pub fn is_clean(&self) -> bool {
        self.failed_ops == 0 && self.violations.is_empty()
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
        for violation in &self.violations {
            println!("Violation: {violation}");
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent appending threads.
    pub threads: usize,
    /// Appends per thread.
    pub appends_per_thread: usize,
    /// Largest payload; actual sizes vary from 0 up to this.
    pub max_payload_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            appends_per_thread: 2_000,
            max_payload_size: 64,
        }
    }
}

fn payload_len(thread: usize, i: usize, max: usize) -> usize {
    (thread * 7 + i * 13) % (max + 1)
}

/// Appends from `config.threads` threads at once, reading each record back
/// right after appending it, then checks ids, payloads and the count.
///
/// `log` should be empty when called.
pub fn stress_concurrent_appends(log: &AppendOnlyLog, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let failed = AtomicUsize::new(0);

    let per_thread: Vec<Vec<(RecordId, Vec<u8>)>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|t| {
                let failed = &failed;
                scope.spawn(move || {
                    let mut appended = Vec::with_capacity(config.appends_per_thread);
                    for i in 0..config.appends_per_thread {
                        let payload = payload_for(t * 1_000_003 + i, payload_len(t, i, config.max_payload_size));
                        match log.append(&payload) {
                            Ok(id) => match log.read_to_vec(id) {
                                Ok(found) if found == payload => appended.push((id, payload)),
                                _ => {
                                    failed.fetch_add(1, Ordering::Relaxed);
                                }
                            },
                            Err(_) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                    appended
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_default())
            .collect()
    });

    let successful: usize = per_thread.iter().map(Vec::len).sum();
    let mut result = StressTestResult::new(successful, failed.into_inner(), start.elapsed());

    for appended in &per_thread {
        if !appended.windows(2).all(|w| w[0].0 < w[1].0) {
            result
                .violations
                .push("ids of one thread are not increasing".to_string());
        }
    }
    let mut ids = HashSet::with_capacity(successful);
    for (id, _) in per_thread.iter().flatten() {
        if !ids.insert(*id) {
            result.violations.push(format!("id {id} handed out twice"));
        }
    }
    for (id, payload) in per_thread.iter().flatten() {
        match log.read_to_vec(*id) {
            Ok(found) if found == *payload => {}
            Ok(_) => result.violations.push(format!("record {id} was overwritten")),
            Err(err) => result.violations.push(format!("record {id} unreadable: {err}")),
        }
    }
    match log.records_count() {
        Ok(count) if count as usize == successful => {}
        Ok(count) => result
            .violations
            .push(format!("records count {count}, {successful} appended")),
        Err(err) => result.violations.push(format!("records count failed: {err}")),
    }
    match log.read_all() {
        Ok(all) if all.len() == successful => {
            if !all.windows(2).all(|w| w[0].0 < w[1].0) {
                result
                    .violations
                    .push("iteration is not in id order".to_string());
            }
        }
        Ok(all) => result.violations.push(format!(
            "iteration yields {} records, {successful} appended",
            all.len()
        )),
        Err(err) => result.violations.push(format!("iteration failed: {err}")),
    }
    result
}

/// Appends from `config.threads` threads while another thread keeps
/// iterating, checking that every iteration sees a growing prefix of
/// readable records.
pub fn stress_append_while_iterating(log: &AppendOnlyLog, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let done = AtomicBool::new(false);
    let failed = AtomicUsize::new(0);

    let (appended, violations) = thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut violations = Vec::new();
            let mut previous = 0usize;
            while !done.load(Ordering::Acquire) {
                let mut seen = 0usize;
                let mut last: Option<RecordId> = None;
                let walked = log.for_each_record(|id, payload| {
                    if last.is_some_and(|prev| prev >= id) {
                        violations.push(format!("iteration went backwards at {id}"));
                    }
                    if payload.len() > config.max_payload_size {
                        violations.push(format!("record {id} has an impossible length"));
                    }
                    // Writers fill payloads with consecutive bytes; a torn
                    // read would show a zero run instead.
                    if payload.windows(2).any(|w| w[1] != w[0].wrapping_add(1)) {
                        violations.push(format!("record {id} was seen partially written"));
                    }
                    last = Some(id);
                    seen += 1;
                    true
                });
                if let Err(err) = walked {
                    violations.push(format!("iteration failed: {err}"));
                    break;
                }
                if seen < previous {
                    violations.push(format!("iteration shrank from {previous} to {seen}"));
                }
                previous = seen;
            }
            violations
        });

        let writers: Vec<_> = (0..config.threads)
            .map(|t| {
                let failed = &failed;
                scope.spawn(move || {
                    let mut count = 0usize;
                    for i in 0..config.appends_per_thread {
                        let payload = payload_for(i, payload_len(t, i, config.max_payload_size));
                        if log.append(&payload).is_ok() {
                            count += 1;
                        } else {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    count
                })
            })
            .collect();
        let appended: usize = writers.into_iter().map(|h| h.join().unwrap_or(0)).sum();
        done.store(true, Ordering::Release);
        let violations = reader.join().unwrap_or_else(|_| vec!["reader panicked".to_string()]);
        (appended, violations)
    });

    let mut result = StressTestResult::new(appended, failed.into_inner(), start.elapsed());
    result.violations = violations;
    result
}

/// Tag byte a writer fills its `i`-th payload with. Never zero.
fn record_tag(thread: usize, i: usize) -> u8 {
    ((thread * 61 + i) % 255 + 1) as u8
}

/// Appends from `config.threads` threads while `readers` threads keep
/// reading every id below the allocation cursor.
///
/// Each payload is filled with a single tag byte. Every successful read
/// must return exactly the tag and length that were appended under that id;
/// every failed read must be `NotCommittedOrCorrupted` or `InvalidId`.
/// Configure `log` without error dumps to keep failed reads cheap.
pub fn stress_read_by_id_during_appends(
    log: &AppendOnlyLog,
    config: &StressConfig,
    readers: usize,
) -> StressTestResult {
    let start = Instant::now();
    let done = AtomicBool::new(false);
    let failed = AtomicUsize::new(0);

    let (appended, observed, mut violations) = thread::scope(|scope| {
        let reader_handles: Vec<_> = (0..readers)
            .map(|_| {
                let done = &done;
                scope.spawn(move || {
                    let mut observed: HashMap<RecordId, (Option<u8>, usize)> = HashMap::new();
                    let mut violations = Vec::new();
                    while !done.load(Ordering::Acquire) {
                        let allocated = match log.header_snapshot() {
                            Ok(header) => header.allocated_up_to,
                            Err(err) => {
                                violations.push(format!("header read failed: {err}"));
                                break;
                            }
                        };
                        let last = RecordId::from_offset(allocated).as_u64();
                        for raw in 1..last {
                            let id = RecordId(raw);
                            match log.read_to_vec(id) {
                                Ok(payload) => {
                                    let tag = payload.first().copied();
                                    if payload.iter().any(|&byte| Some(byte) != tag) {
                                        violations.push(format!("record {id} is not uniform"));
                                    }
                                    let seen = *observed.entry(id).or_insert((tag, payload.len()));
                                    if seen != (tag, payload.len()) {
                                        violations.push(format!("record {id} changed between reads"));
                                    }
                                }
                                Err(LogError::NotCommittedOrCorrupted { .. } | LogError::InvalidId { .. }) => {}
                                Err(err) => violations.push(format!("read of {id} failed: {err}")),
                            }
                        }
                    }
                    (observed, violations)
                })
            })
            .collect();

        let writers: Vec<_> = (0..config.threads)
            .map(|t| {
                let failed = &failed;
                scope.spawn(move || {
                    let mut appended = Vec::with_capacity(config.appends_per_thread);
                    for i in 0..config.appends_per_thread {
                        let tag = record_tag(t, i);
                        let len = payload_len(t, i, config.max_payload_size);
                        match log.append(&vec![tag; len]) {
                            Ok(id) => appended.push((id, tag, len)),
                            Err(_) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                    appended
                })
            })
            .collect();
        let appended: Vec<(RecordId, u8, usize)> = writers
            .into_iter()
            .flat_map(|h| h.join().unwrap_or_default())
            .collect();
        done.store(true, Ordering::Release);

        let mut observed = Vec::new();
        let mut violations = Vec::new();
        for handle in reader_handles {
            match handle.join() {
                Ok((seen, found)) => {
                    observed.extend(seen);
                    violations.extend(found);
                }
                Err(_) => violations.push("reader panicked".to_string()),
            }
        }
        (appended, observed, violations)
    });

    let expected: HashMap<RecordId, (u8, usize)> = appended
        .iter()
        .map(|&(id, tag, len)| (id, (tag, len)))
        .collect();
    for (id, (tag, len)) in observed {
        match expected.get(&id) {
            Some(&(want_tag, want_len)) if len == want_len && (len == 0 || tag == Some(want_tag)) => {}
            Some(_) => violations.push(format!("record {id} read back with the wrong content")),
            None => violations.push(format!("id {id} was readable but never appended")),
        }
    }

    let mut result = StressTestResult::new(appended.len(), failed.into_inner(), start.elapsed());
    result.violations = violations;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> StressConfig {
        StressConfig {
            threads: 4,
            appends_per_thread: 300,
            max_payload_size: 40,
        }
    }

    #[test]
    fn concurrent_appends_in_memory() {
        let log = AppendOnlyLog::open_in_memory(256).unwrap();
        let result = stress_concurrent_appends(&log, &small_config());
        assert!(result.is_clean(), "{:?}", result.violations);
        assert_eq!(result.successful_ops, 1_200);
    }

    #[test]
    fn concurrent_appends_on_file() {
        let test_log = crate::fixtures::TestLog::file(4096);
        let result = stress_concurrent_appends(test_log.log(), &small_config());
        assert!(result.is_clean(), "{:?}", result.violations);
    }

    #[test]
    fn iteration_during_appends() {
        let log = AppendOnlyLog::open_in_memory(512).unwrap();
        let result = stress_append_while_iterating(&log, &small_config());
        assert!(result.is_clean(), "{:?}", result.violations);
        assert_eq!(log.read_all().unwrap().len(), 1_200);
    }

    #[test]
    fn reads_by_id_during_appends() {
        let config = aolog_core::LogConfig::default().dump_on_error(false);
        let log = AppendOnlyLog::open_with_storage(
            Box::new(aolog_storage::InMemoryPagedStorage::new(256).unwrap()),
            config,
        )
        .unwrap();
        let result = stress_read_by_id_during_appends(&log, &small_config(), 2);
        assert!(result.is_clean(), "{:?}", result.violations);
        assert_eq!(result.successful_ops, 1_200);
    }

    #[test]
    fn reads_by_id_during_appends_on_file() {
        let test_log = crate::fixtures::TestLog::file_with_config(
            aolog_core::LogConfig::default()
                .page_size(4096)
                .dump_on_error(false),
        );
        let result = stress_read_by_id_during_appends(test_log.log(), &small_config(), 2);
        assert!(result.is_clean(), "{:?}", result.violations);
    }
}
