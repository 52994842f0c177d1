//! Core type definitions for aolog.

use crate::log::HEADER_SIZE;
use std::fmt;

/// Identifier of a record in an append-only log.
///
/// Ids are derived from the record's header offset: the first record after
/// the log header gets id 1, and every following 4-byte slot adds one. Ids
/// are permanent once issued and never reused. `0` is reserved as
/// [`RecordId::NULL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(pub u64);

impl RecordId {
    /// The reserved "no record" id.
    pub const NULL: Self = Self(0);

    /// Creates a record id from its raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` for [`RecordId::NULL`].
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Derives the id of the record whose header starts at `offset`.
    ///
    /// `offset` must be 4-byte aligned and not inside the log header.
    #[must_use]
    pub const fn from_offset(offset: u64) -> Self {
        debug_assert!(offset >= HEADER_SIZE && offset % 4 == 0);
        Self(((offset - HEADER_SIZE) >> 2) + 1)
    }

    /// Returns the header offset this id addresses, or `None` for the null
    /// id and ids beyond the addressable range.
    #[must_use]
    pub fn to_offset(self) -> Option<u64> {
        self.0
            .checked_sub(1)?
            .checked_mul(4)?
            .checked_add(HEADER_SIZE)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec:{}", self.0)
    }
}

impl From<RecordId> for u64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}
