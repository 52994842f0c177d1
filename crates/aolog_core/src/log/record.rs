//! Record header codec.
//!
//! Every record starts with a 4-byte, 4-byte-aligned header:
//!
//! ```text
//! bit 31     type: 0 = data, 1 = padding
//! bit 30     committed: 1 = payload fully written
//! bits 0-29  total record length, header included
//! ```
//!
//! Data records carry `length - 4` payload bytes after the header; padding
//! records carry nothing and are always stored committed. The stored length
//! is exact; the next record starts at the length rounded up to 4.
//! A zero header marks a slot nobody has written yet.

use crate::error::{LogError, LogResult};
use aolog_storage::Page;

/// Size of a record header in bytes.
pub const RECORD_HEADER_SIZE: usize = 4;

const PADDING_BIT: u32 = 1 << 31;
const COMMITTED_BIT: u32 = 1 << 30;

/// Mask of the length bits in a record header.
pub const LENGTH_MASK: u32 = 0x3FFF_FFFF;

/// Encodes a data record header for a payload of `payload_len` bytes.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the total length does not fit in 30 bits.
pub fn data_header(payload_len: usize, committed: bool) -> LogResult<u32> {
    let total = payload_len
        .checked_add(RECORD_HEADER_SIZE)
        .and_then(|total| u32::try_from(total).ok())
        .filter(|total| total & !LENGTH_MASK == 0)
        .ok_or(LogError::PayloadTooLarge {
            len: payload_len,
            max: LENGTH_MASK as usize - RECORD_HEADER_SIZE,
        })?;
    Ok(if committed { total | COMMITTED_BIT } else { total })
}

/// Encodes a padding header covering `pad_len` bytes (header included).
///
/// # Errors
///
/// Returns `InvariantViolation` if `pad_len` is smaller than a record
/// header or does not fit in 30 bits.
pub fn padding_header(pad_len: usize) -> LogResult<u32> {
    let len = u32::try_from(pad_len)
        .ok()
        .filter(|len| *len as usize >= RECORD_HEADER_SIZE && len & !LENGTH_MASK == 0)
        .ok_or_else(|| {
            LogError::invariant_violation(format!("cannot encode padding of {pad_len} bytes"))
        })?;
    Ok(len | PADDING_BIT | COMMITTED_BIT)
}

/// Returns the stored total length (header included).
#[must_use]
pub const fn length(header: u32) -> u32 {
    header & LENGTH_MASK
}

/// Returns the number of bytes the record occupies, rounded up to 4.
#[must_use]
pub const fn record_length(header: u32) -> u64 {
    (length(header) as u64 + 3) & !3
}

/// Returns the payload length of a data header.
#[must_use]
pub const fn payload_length(header: u32) -> usize {
    (length(header) as usize).saturating_sub(RECORD_HEADER_SIZE)
}

/// Returns `true` for a padding header.
#[must_use]
pub const fn is_padding(header: u32) -> bool {
    header & PADDING_BIT != 0
}

/// Returns `true` for a data header (committed or not).
#[must_use]
pub const fn is_data(header: u32) -> bool {
    header != 0 && header & PADDING_BIT == 0
}

/// Returns `true` if the committed bit is set.
#[must_use]
pub const fn is_committed(header: u32) -> bool {
    header & COMMITTED_BIT != 0
}

/// Returns `true` if a payload of `payload_len` bytes for a record at
/// `offset_in_page` ends inside a page of `page_size` bytes.
#[must_use]
pub fn fits_in_page(offset_in_page: usize, payload_len: usize, page_size: usize) -> bool {
    offset_in_page
        .checked_add(RECORD_HEADER_SIZE)
        .and_then(|start| start.checked_add(payload_len))
        .is_some_and(|end| end <= page_size)
}

/// Decoded state of a record slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Nothing has been stamped at this offset yet.
    Unwritten,
    /// A data record whose payload is still being written.
    AllocatedUncommitted {
        /// Stored total length.
        length: u32,
    },
    /// A fully written data record.
    CommittedData {
        /// Stored total length.
        length: u32,
    },
    /// Filler with no payload.
    CommittedPadding {
        /// Stored total length.
        length: u32,
    },
}

impl RecordState {
    /// Decodes a raw header.
    ///
    /// Padding is accepted whatever its committed bit says; files written by
    /// older versions left it clear.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` for a non-zero header whose length is shorter
    /// than a record header.
    pub fn decode(header: u32) -> LogResult<Self> {
        if header == 0 {
            return Ok(Self::Unwritten);
        }
        let length = length(header);
        if (length as usize) < RECORD_HEADER_SIZE {
            return Err(LogError::corrupted(format!(
                "record header {header:#010x} has length {length}"
            )));
        }
        Ok(if is_padding(header) {
            Self::CommittedPadding { length }
        } else if is_committed(header) {
            Self::CommittedData { length }
        } else {
            Self::AllocatedUncommitted { length }
        })
    }

    /// Returns the stored length, 0 for an unwritten slot.
    #[must_use]
    pub const fn length(self) -> u32 {
        match self {
            Self::Unwritten => 0,
            Self::AllocatedUncommitted { length }
            | Self::CommittedData { length }
            | Self::CommittedPadding { length } => length,
        }
    }

    /// Returns the space the record occupies, rounded up to 4.
    #[must_use]
    pub const fn record_length(self) -> u64 {
        (self.length() as u64 + 3) & !3
    }

    /// Returns the payload length (0 for padding and unwritten slots).
    #[must_use]
    pub const fn payload_length(self) -> usize {
        match self {
            Self::AllocatedUncommitted { length } | Self::CommittedData { length } => {
                length as usize - RECORD_HEADER_SIZE
            }
            Self::Unwritten | Self::CommittedPadding { .. } => 0,
        }
    }

    /// Returns a short human-readable name for the state.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unwritten => "unwritten",
            Self::AllocatedUncommitted { .. } => "uncommitted",
            Self::CommittedData { .. } => "data",
            Self::CommittedPadding { .. } => "padding",
        }
    }
}

/// Stamps a padding record over `pad_len` bytes at `offset_in_page`.
pub(crate) fn write_padding(page: &Page, offset_in_page: usize, pad_len: usize) -> LogResult<()> {
    page.store_u32(offset_in_page, padding_header(pad_len)?)?;
    Ok(())
}

/// Writes a data record in two phases: uncommitted header, payload, then
/// committed header.
///
/// `fill` stores the payload at the offset it is given, with atomic stores
/// ([`Page::store_bytes`]). If it fails the record stays uncommitted and
/// the error is returned.
pub(crate) fn write_data_record<F>(
    page: &Page,
    offset_in_page: usize,
    payload_len: usize,
    fill: F,
) -> LogResult<()>
where
    F: FnOnce(&Page, usize) -> LogResult<()>,
{
    let uncommitted = data_header(payload_len, false)?;
    let committed = data_header(payload_len, true)?;

    page.store_u32(offset_in_page, uncommitted)?;
    fill(page, offset_in_page + RECORD_HEADER_SIZE)?;
    // Release: publishes the payload words to readers that see the bit.
    page.store_u32(offset_in_page, committed)?;
    Ok(())
}

/// Returns a view of the payload of the record at `offset_in_page`.
///
/// Callers must only pass ranges that can no longer be written: a record
/// reached by walking the record chain from the log header whose committed
/// data header was loaded, or a range that ends at or below the committed
/// cursor.
#[allow(unsafe_code)]
pub(crate) fn payload_view(page: &Page, offset_in_page: usize, payload_len: usize) -> LogResult<&[u8]> {
    // SAFETY: per the contract above the range is either a committed
    // record's own payload, written before its header was released and never
    // again, or lies entirely below the committed cursor, which only moves
    // past finished records. Nothing writes it while the view is alive.
    Ok(unsafe { page.bytes(offset_in_page + RECORD_HEADER_SIZE, payload_len)? })
}
