//! Property-based test generators using proptest.
//!
//! Provides strategies for payloads, page sizes and sequences of log
//! operations, plus a reference model to replay those sequences against.

use aolog_core::{AppendOnlyLog, LogResult, RecordId, MIN_PAGE_SIZE};
use proptest::prelude::*;

/// Strategy for a single payload of up to `max_len` bytes.
pub fn payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for up to `max_count` payloads of up to `max_len` bytes each.
pub fn payloads_strategy(max_len: usize, max_count: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(max_len), 0..=max_count)
}

/// Strategy for valid page sizes in `[MIN_PAGE_SIZE, max]`.
pub fn page_size_strategy(max: u32) -> impl Strategy<Value = u32> {
    (MIN_PAGE_SIZE / 4..=max / 4).prop_map(|words| words * 4)
}

/// Strategy for a page size together with payloads that fit it.
pub fn page_and_payloads_strategy(
    max_page_size: u32,
    max_count: usize,
) -> impl Strategy<Value = (u32, Vec<Vec<u8>>)> {
    page_size_strategy(max_page_size).prop_flat_map(move |page_size| {
        let max_payload = page_size as usize - 4;
        (Just(page_size), payloads_strategy(max_payload, max_count))
    })
}

/// An operation on a log.
#[derive(Debug, Clone)]
pub enum LogOperation {
    /// Append a record.
    Append {
        /// Record payload.
        payload: Vec<u8>,
    },
    /// Start an append whose writer fails.
    AbandonedAppend {
        /// Requested payload length.
        len: usize,
    },
    /// Read back a previously appended record.
    Read {
        /// Index into the records appended so far (modulo their count).
        index: usize,
    },
    /// Close and reopen the log.
    Reopen,
    /// Kill and reopen the log.
    Crash,
}

/// Strategy for a single operation with payloads up to `max_len` bytes.
pub fn operation_strategy(max_len: usize) -> impl Strategy<Value = LogOperation> {
    prop_oneof![
        6 => payload_strategy(max_len).prop_map(|payload| LogOperation::Append { payload }),
        1 => (0..=max_len).prop_map(|len| LogOperation::AbandonedAppend { len }),
        3 => any::<usize>().prop_map(|index| LogOperation::Read { index }),
        1 => Just(LogOperation::Reopen),
        1 => Just(LogOperation::Crash),
    ]
}

/// Strategy for a sequence of operations.
pub fn operations_strategy(max_len: usize, max_ops: usize) -> impl Strategy<Value = Vec<LogOperation>> {
    prop::collection::vec(operation_strategy(max_len), 1..=max_ops)
}

/// What a log should contain: every committed record in append order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogModel {
    records: Vec<(RecordId, Vec<u8>)>,
}

impl LogModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a committed append.
    pub fn appended(&mut self, id: RecordId, payload: Vec<u8>) {
        self.records.push((id, payload));
    }

    /// Returns the modelled records.
    pub fn records(&self) -> &[(RecordId, Vec<u8>)] {
        &self.records
    }

    /// Picks a record by wrapping index, `None` if nothing was appended.
    pub fn pick(&self, index: usize) -> Option<&(RecordId, Vec<u8>)> {
        if self.records.is_empty() {
            None
        } else {
            self.records.get(index % self.records.len())
        }
    }

    /// Checks `log` against the model: every record readable, iteration in
    /// the same order, the same count.
    pub fn check(&self, log: &AppendOnlyLog) -> LogResult<Result<(), String>> {
        for (id, payload) in &self.records {
            let found = log.read_to_vec(*id)?;
            if found != *payload {
                return Ok(Err(format!("record {id} differs from the model")));
            }
        }
        let all = log.read_all()?;
        if all != self.records {
            return Ok(Err(format!(
                "iteration yields {} records, model has {}",
                all.len(),
                self.records.len()
            )));
        }
        let count = log.records_count()? as usize;
        if count != self.records.len() {
            return Ok(Err(format!(
                "records count {count}, model has {}",
                self.records.len()
            )));
        }
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash::abandon_append;
    use crate::fixtures::TestLog;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn page_sizes_are_valid(page_size in page_size_strategy(4096)) {
            prop_assert!(page_size >= MIN_PAGE_SIZE);
            prop_assert_eq!(page_size % 4, 0);
        }

        #[test]
        fn payloads_round_trip_on_any_page_size(
            (page_size, payloads) in page_and_payloads_strategy(512, 30)
        ) {
            let log = AppendOnlyLog::open_in_memory(page_size).unwrap();
            let mut model = LogModel::new();
            for payload in payloads {
                let id = log.append(&payload).unwrap();
                model.appended(id, payload);
            }
            prop_assert_eq!(model.check(&log).unwrap(), Ok(()));
        }

        #[test]
        fn operation_sequences_match_model(ops in operations_strategy(100, 40)) {
            let mut test_log = TestLog::memory(128);
            let mut model = LogModel::new();
            let mut last: Option<RecordId> = None;

            for op in ops {
                match op {
                    LogOperation::Append { payload } => {
                        let id = test_log.append(&payload).unwrap();
                        prop_assert!(last.map_or(true, |prev| id > prev));
                        last = Some(id);
                        model.appended(id, payload);
                    }
                    LogOperation::AbandonedAppend { len } => {
                        let id = abandon_append(test_log.log(), len, len / 2).unwrap();
                        prop_assert!(test_log.read(id, |_| ()).is_err());
                        last = Some(id);
                    }
                    LogOperation::Read { index } => {
                        if let Some((id, payload)) = model.pick(index) {
                            prop_assert_eq!(&test_log.read_to_vec(*id).unwrap(), payload);
                        }
                    }
                    LogOperation::Reopen => {
                        test_log.reopen().unwrap();
                    }
                    LogOperation::Crash => {
                        test_log.crash_and_reopen().unwrap();
                    }
                }
            }
            // Abandoned appends hold back the count until the next open.
            test_log.reopen().unwrap();
            prop_assert_eq!(model.check(test_log.log()).unwrap(), Ok(()));
        }
    }
}
