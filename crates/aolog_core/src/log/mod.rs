//! Append-only record log over paged storage.
//!
//! The log is the core of aolog. Records are appended without locks: space
//! is claimed with a compare-and-swap on the allocation cursor, the payload
//! is written in place, and the record header is stamped twice (uncommitted,
//! then committed) so that readers never observe a partial payload.
//!
//! ## File Format
//!
//! ```text
//! | header (64) | record | record | ... | padding | record | ...
//!               ^ id 1                  ^ page boundary
//! ```
//!
//! Records are 4-byte aligned and never cross a page boundary; the tail of a
//! page that cannot hold the next record is filled with a padding record.
//! See [`record`] and [`header`] for the bit-level layout.
//!
//! ## Recovery Policy
//!
//! The two header cursors only disagree when a session ended with appends
//! in flight. On open:
//!
//! - **Unfinished data records** are turned into padding: their ids become
//!   permanently unreadable.
//! - **Unwritten slots** (space allocated but no header stamped yet) end the
//!   walk: nothing after them can be located, so it is discarded and zeroed.
//! - **Records count** is recomputed by a full scan, since the count update
//!   trails the commit cursor update.
//!
//! Malformed headers (non-zero with a length below 4, or records crossing a
//! page boundary) are fatal: the log refuses to open.
//!
//! ## Invariants
//!
//! - `committed_up_to <= allocated_up_to`, both monotonic during a session
//! - every record below `committed_up_to` is fully written
//! - every byte at or above `allocated_up_to` is zero
//! - ids are derived from offsets and never reused

mod append_only;
mod dump;
pub mod header;
pub mod record;
mod recovery;
mod scan;
mod walker;

pub use append_only::AppendOnlyLog;
pub use dump::to_hex;
pub use header::{
    check_file_params_compatible, HeaderSnapshot, HEADER_SIZE, IMPLEMENTATION_VERSION, MAGIC,
    USER_FIELDS,
};
pub use record::{RecordState, RECORD_HEADER_SIZE};
pub use scan::{verify_storage, RecordScanner, ScannedRecord, VerifyReport};
