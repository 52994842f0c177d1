//! Human-readable content dumps for read failures and debugging.

use crate::error::LogResult;
use crate::log::append_only::AppendOnlyLog;
use crate::log::record::{fits_in_page, payload_view, RecordState};
use crate::log::walker::RecordWalker;
use crate::log::HEADER_SIZE;
use crate::types::RecordId;
use std::fmt::Write;

/// Renders bytes as lowercase hex, two digits per byte.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

impl AppendOnlyLog {
    /// Renders every record whose id lies within `width` ids of `around`.
    ///
    /// Each line shows the id, offset, stored length and up to `max_bytes`
    /// of the payload as hex. The record containing `around` is marked with
    /// `*`. Only committed payloads are shown; other records get a header
    /// line alone.
    ///
    /// # Errors
    ///
    /// Returns `ClosedStorage` after close or a corruption error from the
    /// walk. Records already rendered are not returned in that case.
    pub fn dump_content_around_id(
        &self,
        around: RecordId,
        width: u64,
        max_bytes: usize,
    ) -> LogResult<String> {
        let allocated = self.header_snapshot()?.allocated_up_to;
        let from_id = around.as_u64().saturating_sub(width);
        let to_id = around.as_u64().saturating_add(width);

        let storage = self.storage();
        let page_size = storage.page_size() as usize;
        let mut walker = RecordWalker::new(storage);
        let mut out = String::new();
        let mut offset = HEADER_SIZE;

        while offset < allocated {
            let id = RecordId::from_offset(offset);
            if id.as_u64() > to_id {
                break;
            }
            let state = walker.state_at(offset)?;
            if state == RecordState::Unwritten {
                let _ = writeln!(out, " [id: {}][offset: {offset}][unwritten]", id.as_u64());
                break;
            }
            let next = walker.next_offset(offset, state)?;

            if id.as_u64() >= from_id {
                let next_id = RecordId::from_offset(next).as_u64();
                let marker = if (id.as_u64()..next_id).contains(&around.as_u64()) {
                    '*'
                } else {
                    ' '
                };
                let _ = write!(
                    out,
                    "{marker}[id: {}][offset: {offset}][len: {}][{}]",
                    id.as_u64(),
                    state.length(),
                    state.name()
                );
                let payload_len = state.payload_length();
                let (page, in_page) = walker.locate(offset)?;
                let committed = matches!(state, RecordState::CommittedData { .. });
                if committed && payload_len > 0 && fits_in_page(in_page, payload_len, page_size) {
                    let shown = payload_len.min(max_bytes);
                    let bytes = payload_view(page, in_page, shown)?;
                    let ellipsis = if shown < payload_len { " ..." } else { "" };
                    let _ = write!(out, "[hex: {}{ellipsis}]", to_hex(bytes));
                }
                out.push('\n');
            }
            offset = next;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn hex_encoding() {
        assert_eq!(to_hex(&[0x00, 0xab, 0x7f]), "00ab7f");
        assert_eq!(to_hex(&[]), "");
    }

    #[test]
    fn dump_marks_requested_record() {
        let log = AppendOnlyLog::open_in_memory(4096).unwrap();
        log.append(b"\x01").unwrap();
        let middle = log.append(b"\x02\x03").unwrap();
        log.append(b"\x04").unwrap();

        let dump = log.dump_content_around_id(middle, 100, 16).unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(" [id: 1]"));
        assert!(lines[1].starts_with("*[id: 3][offset: 72][len: 6][data][hex: 0203]"));
        assert!(lines[2].contains("[hex: 04]"));
    }

    #[test]
    fn dump_truncates_payloads_and_limits_width() {
        let log = AppendOnlyLog::open_in_memory(4096).unwrap();
        for _ in 0..10 {
            log.append(&[0xAA; 12]).unwrap();
        }
        // Each record is 16 bytes, so ids advance by 4.
        let dump = log.dump_content_around_id(RecordId(17), 4, 2).unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(" [id: 13]"));
        assert!(lines[1].starts_with("*[id: 17]"));
        assert!(lines[1].ends_with("[hex: aaaa ...]"));
        assert!(lines[2].starts_with(" [id: 21]"));
    }

    #[test]
    fn dump_hides_unfinished_payloads() {
        let log = AppendOnlyLog::open_in_memory(4096).unwrap();
        let _ = log.append_with(2, |slot| {
            slot[0] = 0x11;
            Err(io::Error::new(io::ErrorKind::Other, "half written"))
        });

        let dump = log.dump_content_around_id(RecordId(1), 8, 8).unwrap();
        assert_eq!(dump.lines().next(), Some("*[id: 1][offset: 64][len: 6][uncommitted]"));
    }
}
