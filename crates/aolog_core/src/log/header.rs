//! Log header layout.
//!
//! The first [`HEADER_SIZE`] bytes of the file hold log-wide fields. All of
//! them are native-endian and naturally aligned, so they are read with
//! acquire loads and written with release stores straight on the header
//! page:
//!
//! ```text
//! offset  size  field
//!      0     4  magic ("AOLM")
//!      4     4  implementation version
//!      8     4  data version (caller-defined)
//!     12     4  page size
//!     16     8  allocated-up-to cursor
//!     24     8  committed-up-to cursor
//!     32     4  committed data records count
//!     36     4  status (0 = closed, 1 = opened)
//!     40    20  user fields [5 x u32]
//!     60     4  reserved
//! ```

use crate::error::{LogError, LogResult};
use aolog_storage::Page;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

/// Magic tag identifying an aolog file.
pub const MAGIC: u32 = u32::from_be_bytes(*b"AOLM");

/// Version of the on-disk format written by this implementation.
pub const IMPLEMENTATION_VERSION: u32 = 2;

/// Size of the log header region in bytes.
pub const HEADER_SIZE: u64 = 64;

/// Number of caller-defined header slots.
pub const USER_FIELDS: usize = 5;

/// Status value stored while the log is open.
pub const STATUS_OPENED: u32 = 1;

/// Status value stored by a proper close (and in a fresh file).
pub const STATUS_CLOSED: u32 = 0;

const MAGIC_OFFSET: usize = 0;
const IMPLEMENTATION_VERSION_OFFSET: usize = 4;
const DATA_VERSION_OFFSET: usize = 8;
const PAGE_SIZE_OFFSET: usize = 12;
/// Byte offset of the allocated-up-to cursor.
pub const ALLOCATED_UP_TO_OFFSET: usize = 16;
/// Byte offset of the committed-up-to cursor.
pub const COMMITTED_UP_TO_OFFSET: usize = 24;
/// Byte offset of the records count.
pub const RECORDS_COUNT_OFFSET: usize = 32;
/// Byte offset of the status field.
pub const STATUS_OFFSET: usize = 36;
const USER_FIELDS_OFFSET: usize = 40;

fn user_field_offset(slot: usize) -> LogResult<usize> {
    if slot >= USER_FIELDS {
        return Err(LogError::invalid_argument(format!(
            "user field slot {slot} is out of range [0..{USER_FIELDS})"
        )));
    }
    Ok(USER_FIELDS_OFFSET + slot * 4)
}

/// Typed accessors over the shared header page.
#[derive(Debug, Clone)]
pub(crate) struct HeaderFields {
    page: Arc<Page>,
}

impl HeaderFields {
    pub(crate) fn new(page: Arc<Page>) -> Self {
        Self { page }
    }

    /// Stamps the format fields of a brand-new file.
    pub(crate) fn initialize(&self, page_size: u32) -> LogResult<()> {
        self.page.store_u32(MAGIC_OFFSET, MAGIC)?;
        self.page
            .store_u32(IMPLEMENTATION_VERSION_OFFSET, IMPLEMENTATION_VERSION)?;
        self.page.store_u32(PAGE_SIZE_OFFSET, page_size)?;
        Ok(())
    }

    pub(crate) fn implementation_version(&self) -> LogResult<u32> {
        Ok(self.page.load_u32(IMPLEMENTATION_VERSION_OFFSET)?)
    }

    pub(crate) fn data_version(&self) -> LogResult<u32> {
        Ok(self.page.load_u32(DATA_VERSION_OFFSET)?)
    }

    pub(crate) fn set_data_version(&self, version: u32) -> LogResult<()> {
        Ok(self.page.store_u32(DATA_VERSION_OFFSET, version)?)
    }

    pub(crate) fn allocated_up_to(&self) -> LogResult<u64> {
        Ok(self.page.load_u64(ALLOCATED_UP_TO_OFFSET)?)
    }

    pub(crate) fn set_allocated_up_to(&self, offset: u64) -> LogResult<()> {
        Ok(self.page.store_u64(ALLOCATED_UP_TO_OFFSET, offset)?)
    }

    pub(crate) fn cas_allocated_up_to(&self, current: u64, new: u64) -> LogResult<bool> {
        Ok(self
            .page
            .compare_exchange_u64(ALLOCATED_UP_TO_OFFSET, current, new)?)
    }

    pub(crate) fn committed_up_to(&self) -> LogResult<u64> {
        Ok(self.page.load_u64(COMMITTED_UP_TO_OFFSET)?)
    }

    pub(crate) fn set_committed_up_to(&self, offset: u64) -> LogResult<()> {
        Ok(self.page.store_u64(COMMITTED_UP_TO_OFFSET, offset)?)
    }

    pub(crate) fn cas_committed_up_to(&self, current: u64, new: u64) -> LogResult<bool> {
        Ok(self
            .page
            .compare_exchange_u64(COMMITTED_UP_TO_OFFSET, current, new)?)
    }

    pub(crate) fn records_count(&self) -> LogResult<u32> {
        Ok(self.page.load_u32(RECORDS_COUNT_OFFSET)?)
    }

    pub(crate) fn set_records_count(&self, count: u32) -> LogResult<()> {
        Ok(self.page.store_u32(RECORDS_COUNT_OFFSET, count)?)
    }

    pub(crate) fn add_records_count(&self, delta: u32) -> LogResult<u32> {
        Ok(self.page.fetch_add_u32(RECORDS_COUNT_OFFSET, delta)?)
    }

    pub(crate) fn status(&self) -> LogResult<u32> {
        Ok(self.page.load_u32(STATUS_OFFSET)?)
    }

    pub(crate) fn set_status(&self, status: u32) -> LogResult<()> {
        Ok(self.page.store_u32(STATUS_OFFSET, status)?)
    }

    pub(crate) fn user_field(&self, slot: usize) -> LogResult<u32> {
        Ok(self.page.load_u32(user_field_offset(slot)?)?)
    }

    pub(crate) fn set_user_field(&self, slot: usize, value: u32) -> LogResult<()> {
        Ok(self.page.store_u32(user_field_offset(slot)?, value)?)
    }

    /// Reads every field into a snapshot.
    pub(crate) fn snapshot(&self) -> LogResult<HeaderSnapshot> {
        let mut user_fields = [0u32; USER_FIELDS];
        for (slot, field) in user_fields.iter_mut().enumerate() {
            *field = self.user_field(slot)?;
        }
        Ok(HeaderSnapshot {
            magic: self.page.load_u32(MAGIC_OFFSET)?,
            implementation_version: self.implementation_version()?,
            data_version: self.data_version()?,
            page_size: self.page.load_u32(PAGE_SIZE_OFFSET)?,
            allocated_up_to: self.allocated_up_to()?,
            committed_up_to: self.committed_up_to()?,
            records_count: self.records_count()?,
            status: self.status()?,
            user_fields,
        })
    }
}

/// A point-in-time copy of the log header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderSnapshot {
    /// Magic tag.
    pub magic: u32,
    /// On-disk format version.
    pub implementation_version: u32,
    /// Caller-defined data version.
    pub data_version: u32,
    /// Page size the file was created with.
    pub page_size: u32,
    /// First offset not yet allocated.
    pub allocated_up_to: u64,
    /// First offset not yet committed.
    pub committed_up_to: u64,
    /// Committed data records count.
    pub records_count: u32,
    /// Open/closed status.
    pub status: u32,
    /// Caller-defined fields.
    pub user_fields: [u32; USER_FIELDS],
}

fn ne_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_ne_bytes(buf)
}

fn ne_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_ne_bytes(buf)
}

fn describe(path: Option<&Path>) -> String {
    path.map_or_else(|| "<memory>".to_string(), |p| p.display().to_string())
}

impl HeaderSnapshot {
    /// Decodes a header from raw file bytes.
    ///
    /// # Errors
    ///
    /// Returns `FormatIncompatible` if fewer than [`HEADER_SIZE`] bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> LogResult<Self> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(LogError::format_incompatible(format!(
                "header is truncated: {} bytes, {HEADER_SIZE} expected",
                bytes.len()
            )));
        }
        let mut user_fields = [0u32; USER_FIELDS];
        for (slot, field) in user_fields.iter_mut().enumerate() {
            *field = ne_u32(bytes, USER_FIELDS_OFFSET + slot * 4);
        }
        Ok(Self {
            magic: ne_u32(bytes, MAGIC_OFFSET),
            implementation_version: ne_u32(bytes, IMPLEMENTATION_VERSION_OFFSET),
            data_version: ne_u32(bytes, DATA_VERSION_OFFSET),
            page_size: ne_u32(bytes, PAGE_SIZE_OFFSET),
            allocated_up_to: ne_u64(bytes, ALLOCATED_UP_TO_OFFSET),
            committed_up_to: ne_u64(bytes, COMMITTED_UP_TO_OFFSET),
            records_count: ne_u32(bytes, RECORDS_COUNT_OFFSET),
            status: ne_u32(bytes, STATUS_OFFSET),
            user_fields,
        })
    }

    /// Reads the header of a log file without mapping or modifying it.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, or `FormatIncompatible` if
    /// it is shorter than the header.
    pub fn read_from(path: &Path) -> LogResult<Self> {
        let mut file = File::open(path)?;
        let mut bytes = [0u8; HEADER_SIZE as usize];
        match file.read_exact(&mut bytes) {
            Ok(()) => Self::from_bytes(&bytes),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(
                LogError::format_incompatible(format!("[{}] is too short for a log header", path.display())),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the magic tag as text, with non-printable bytes shown as `?`.
    #[must_use]
    pub fn magic_ascii(&self) -> String {
        self.magic
            .to_be_bytes()
            .iter()
            .map(|&b| if b.is_ascii_graphic() { b as char } else { '?' })
            .collect()
    }

    /// Returns `true` if the status field says the log was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status == STATUS_CLOSED
    }

    /// Returns `true` if the cursors disagree, i.e. the next open recovers.
    #[must_use]
    pub fn needs_recovery(&self) -> bool {
        self.committed_up_to < self.allocated_up_to
    }

    /// Checks magic, format version and page size against this
    /// implementation and the storage's `page_size`.
    ///
    /// # Errors
    ///
    /// Returns `FormatIncompatible` describing the first mismatch.
    pub fn check_compatible(&self, path: Option<&Path>, page_size: u32) -> LogResult<()> {
        if self.magic != MAGIC {
            return Err(LogError::format_incompatible(format!(
                "[{}] is not an append-only log: magic {:#010x} ('{}') != {MAGIC:#010x} expected",
                describe(path),
                self.magic,
                self.magic_ascii()
            )));
        }
        if self.implementation_version != IMPLEMENTATION_VERSION {
            return Err(LogError::format_incompatible(format!(
                "[{}] implementation version {} is not supported: {IMPLEMENTATION_VERSION} expected",
                describe(path),
                self.implementation_version
            )));
        }
        if self.page_size != page_size {
            return Err(LogError::format_incompatible(format!(
                "[{}] was created with page size {} but storage page size is {page_size}",
                describe(path),
                self.page_size
            )));
        }
        Ok(())
    }
}

/// Checks raw header bytes against this implementation and `page_size`.
///
/// # Errors
///
/// Returns `FormatIncompatible` if the header is truncated or any of magic,
/// format version or page size disagree.
pub fn check_file_params_compatible(
    path: Option<&Path>,
    header_bytes: &[u8],
    page_size: u32,
) -> LogResult<()> {
    HeaderSnapshot::from_bytes(header_bytes)?.check_compatible(path, page_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aolog_storage::{InMemoryPagedStorage, PagedStorage};

    fn header_bytes(magic: u32, version: u32, page_size: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE as usize];
        bytes[0..4].copy_from_slice(&magic.to_ne_bytes());
        bytes[4..8].copy_from_slice(&version.to_ne_bytes());
        bytes[12..16].copy_from_slice(&page_size.to_ne_bytes());
        bytes[16..24].copy_from_slice(&128u64.to_ne_bytes());
        bytes[24..32].copy_from_slice(&96u64.to_ne_bytes());
        bytes[40..44].copy_from_slice(&7u32.to_ne_bytes());
        bytes
    }

    #[test]
    fn magic_reads_as_tag() {
        let bytes = header_bytes(MAGIC, IMPLEMENTATION_VERSION, 4096);
        let snapshot = HeaderSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(snapshot.magic_ascii(), "AOLM");
        assert_eq!(snapshot.allocated_up_to, 128);
        assert_eq!(snapshot.committed_up_to, 96);
        assert_eq!(snapshot.user_fields[0], 7);
        assert!(snapshot.needs_recovery());
        assert!(snapshot.is_closed());
    }

    #[test]
    fn compatible_header_passes() {
        let bytes = header_bytes(MAGIC, IMPLEMENTATION_VERSION, 4096);
        assert!(check_file_params_compatible(None, &bytes, 4096).is_ok());
    }

    #[test]
    fn wrong_magic_rejected() {
        let bytes = header_bytes(u32::from_be_bytes(*b"NOPE"), IMPLEMENTATION_VERSION, 4096);
        let err = check_file_params_compatible(None, &bytes, 4096).unwrap_err();
        assert!(matches!(err, LogError::FormatIncompatible { .. }));
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn wrong_version_rejected() {
        let bytes = header_bytes(MAGIC, 1, 4096);
        assert!(matches!(
            check_file_params_compatible(None, &bytes, 4096),
            Err(LogError::FormatIncompatible { .. })
        ));
    }

    #[test]
    fn wrong_page_size_rejected() {
        let bytes = header_bytes(MAGIC, IMPLEMENTATION_VERSION, 4096);
        let err = check_file_params_compatible(Some(Path::new("x.log")), &bytes, 8192).unwrap_err();
        assert!(err.to_string().contains("page size 4096"));
    }

    #[test]
    fn truncated_header_rejected() {
        assert!(matches!(
            HeaderSnapshot::from_bytes(&[0u8; 10]),
            Err(LogError::FormatIncompatible { .. })
        ));
    }

    #[test]
    fn fields_roundtrip_through_page() {
        let storage = InMemoryPagedStorage::new(128).unwrap();
        let fields = HeaderFields::new(storage.page_by_offset(0).unwrap());
        fields.initialize(128).unwrap();
        fields.set_allocated_up_to(HEADER_SIZE).unwrap();
        fields.set_committed_up_to(HEADER_SIZE).unwrap();
        fields.set_user_field(4, 99).unwrap();
        fields.set_data_version(3).unwrap();
        assert_eq!(fields.add_records_count(2).unwrap(), 0);

        assert!(fields.cas_allocated_up_to(HEADER_SIZE, 72).unwrap());
        assert!(!fields.cas_allocated_up_to(HEADER_SIZE, 80).unwrap());

        let snapshot = fields.snapshot().unwrap();
        assert!(snapshot.check_compatible(None, 128).is_ok());
        assert_eq!(snapshot.allocated_up_to, 72);
        assert_eq!(snapshot.records_count, 2);
        assert_eq!(snapshot.data_version, 3);
        assert_eq!(snapshot.user_fields, [0, 0, 0, 0, 99]);
    }

    #[test]
    fn user_field_slot_out_of_range() {
        let storage = InMemoryPagedStorage::new(128).unwrap();
        let fields = HeaderFields::new(storage.page_by_offset(0).unwrap());
        assert!(matches!(
            fields.user_field(USER_FIELDS),
            Err(LogError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn read_from_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.log");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(matches!(
            HeaderSnapshot::read_from(&path),
            Err(LogError::FormatIncompatible { .. })
        ));
    }
}
