//! Binary format structures

use bytemuck::{Pod, Zeroable};

use crate::{ReelError, Result};

/// File magic bytes: "REEL\x00\x01\x00\x00"
pub const FILE_MAGIC: [u8; 8] = [0x52, 0x45, 0x45, 0x4C, 0x00, 0x01, 0x00, 0x00];

/// Current format version
pub const FILE_VERSION: u32 = 1;

/// File header size (cache-aligned to 128 bytes)
pub const HEADER_SIZE: usize = 128;

/// Index entry size (cache-aligned to 128 bytes)
pub const INDEX_ENTRY_SIZE: usize = 128;

/// Maximum number of interactions in one cassette file
pub const MAX_INTERACTIONS: u64 = 65_536;

/// File header (128 bytes, cache-aligned)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, align(128))]
pub struct FileHeader {
    /// Magic bytes for file format identification
    pub magic: [u8; 8],

    /// Format version
    pub version: u32,

    /// CRC32 of header (excluding this field)
    pub header_crc: u32,

    /// Cassette ID (SHA-256 of the cassette name)
    pub cassette_id: [u8; 32],

    /// Number of interactions stored
    pub interaction_count: u64,

    /// Offset to start of data section
    pub data_offset: u64,

    /// Size of the data section in bytes
    pub data_size: u64,

    /// Creation timestamp (Unix epoch nanoseconds)
    pub created_at: u64,

    /// Reserved for future use
    pub reserved: [u8; 48],
}

static_assertions::const_assert_eq!(std::mem::size_of::<FileHeader>(), HEADER_SIZE);
static_assertions::const_assert_eq!(std::mem::align_of::<FileHeader>(), 128);

/// Index entry for a single interaction (128 bytes, cache-aligned)
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, align(128))]
pub struct InteractionEntry {
    /// Request fingerprint (SHA-256)
    pub request_hash: [u8; 32],

    /// Offset to request data
    pub request_offset: u64,

    /// Offset to response data
    pub response_offset: u64,

    /// Timestamp (Unix epoch nanoseconds)
    pub recorded_at: u64,

    /// Request data size
    pub request_size: u32,

    /// Response data size
    pub response_size: u32,

    /// CRC32 of request data
    pub request_crc: u32,

    /// CRC32 of response data
    pub response_crc: u32,

    /// Reserved for future use
    pub reserved: [u8; 32],

    /// Reserved for future use
    pub reserved_tail: [u8; 24],
}

static_assertions::const_assert_eq!(std::mem::size_of::<InteractionEntry>(), INDEX_ENTRY_SIZE);
static_assertions::const_assert_eq!(std::mem::align_of::<InteractionEntry>(), 128);

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            magic: FILE_MAGIC,
            version: FILE_VERSION,
            header_crc: 0,
            cassette_id: [0; 32],
            interaction_count: 0,
            data_offset: HEADER_SIZE as u64,
            data_size: 0,
            created_at: 0,
            reserved: [0; 48],
        }
    }
}

impl FileHeader {
    /// Offset one past the last data byte, `None` if it overflows
    #[must_use]
    pub fn end_offset(&self) -> Option<u64> {
        self.data_offset.checked_add(self.data_size)
    }
}

/// Convert a length to the `u32` stored on disk
///
/// # Errors
///
/// Returns error if `len` does not fit in a `u32`
pub(super) fn stored_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| ReelError::DataTooLarge {
        size: len,
        limit: u32::MAX as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        assert_eq!(std::mem::size_of::<FileHeader>(), 128);
        assert_eq!(std::mem::align_of::<FileHeader>(), 128);
    }

    #[test]
    fn test_index_entry_size() {
        assert_eq!(std::mem::size_of::<InteractionEntry>(), 128);
        assert_eq!(std::mem::align_of::<InteractionEntry>(), 128);
    }

    #[test]
    fn test_default_header() {
        let header = FileHeader::default();
        assert_eq!(header.magic, FILE_MAGIC);
        assert_eq!(header.version, FILE_VERSION);
        assert_eq!(header.interaction_count, 0);
        assert_eq!(header.end_offset(), Some(HEADER_SIZE as u64));
    }

    #[test]
    fn test_end_offset_overflow() {
        let header = FileHeader {
            data_offset: u64::MAX - 1,
            data_size: 2,
            ..FileHeader::default()
        };
        assert_eq!(header.end_offset(), None);
    }

    #[test]
    fn test_stored_len_limit() {
        assert_eq!(stored_len(7).unwrap(), 7);
        assert_eq!(stored_len(u32::MAX as usize).unwrap(), u32::MAX);

        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            stored_len(u32::MAX as usize + 1),
            Err(ReelError::DataTooLarge { .. })
        ));
    }
}
