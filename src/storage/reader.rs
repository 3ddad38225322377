//! Cassette file reader

use std::fs::File;
use std::path::Path;

use bytemuck::pod_read_unaligned;
use memmap2::Mmap;

use super::format::{FileHeader, InteractionEntry, HEADER_SIZE, INDEX_ENTRY_SIZE};
use super::writer::header_crc;
use crate::{ReelError, Result};

/// Reader for cassette files
pub struct CassetteReader {
    _file: File,
    mmap: Mmap,
    header: FileHeader,
    data_end: u64,
}

impl CassetteReader {
    /// Open an existing cassette file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be opened, mapped, or is invalid
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;

        if file.metadata()?.len() < HEADER_SIZE as u64 {
            return Err(ReelError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }

        // SAFETY: the map is read-only; cassettes are not modified while loaded
        let mmap = unsafe { Mmap::map(&file)? };

        let header: FileHeader = pod_read_unaligned(&mmap[..HEADER_SIZE]);

        // Validate magic and version
        super::validate_header(&header)?;

        let computed_crc = header_crc(&mmap[..HEADER_SIZE]);
        if header.header_crc != computed_crc {
            return Err(ReelError::CorruptedData {
                offset: 0,
                expected: header.header_crc,
                actual: computed_crc,
            });
        }

        let index_end = header
            .interaction_count
            .checked_mul(INDEX_ENTRY_SIZE as u64)
            .and_then(|size| size.checked_add(HEADER_SIZE as u64));
        let (Some(index_end), Some(data_end)) = (index_end, header.end_offset()) else {
            return Err(ReelError::InvalidFormat(
                "Index or data section size overflows".to_string(),
            ));
        };

        if index_end > header.data_offset || data_end > mmap.len() as u64 {
            return Err(ReelError::InvalidFormat(format!(
                "Index or data section extends beyond file: {data_end} > {}",
                mmap.len()
            )));
        }

        Ok(Self {
            _file: file,
            mmap,
            header,
            data_end,
        })
    }

    /// Get the number of interactions in this cassette
    #[must_use]
    pub fn interaction_count(&self) -> u64 {
        self.header.interaction_count
    }

    /// Get the cassette ID
    #[must_use]
    pub fn cassette_id(&self) -> [u8; 32] {
        self.header.cassette_id
    }

    /// Get the creation time (Unix epoch nanoseconds)
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.header.created_at
    }

    /// Lookup the first interaction with the given request fingerprint
    #[must_use]
    pub fn lookup(&self, request_hash: [u8; 32]) -> Option<InteractionEntry> {
        self.entries_iter()
            .find(|entry| entry.request_hash == request_hash)
    }

    /// Iterate over index entries in recording order
    pub fn entries_iter(&self) -> impl Iterator<Item = InteractionEntry> + '_ {
        (0..self.header.interaction_count as usize).map(move |i| {
            let offset = HEADER_SIZE + (i * INDEX_ENTRY_SIZE);
            pod_read_unaligned(&self.mmap[offset..offset + INDEX_ENTRY_SIZE])
        })
    }

    /// Get all index entries
    #[must_use]
    pub fn all_entries(&self) -> Vec<InteractionEntry> {
        self.entries_iter().collect()
    }

    /// Read request data for an interaction
    ///
    /// # Errors
    ///
    /// Returns error if offset is invalid or the data fails its checksum
    pub fn read_request(&self, entry: &InteractionEntry) -> Result<&[u8]> {
        self.read_checked(entry.request_offset, entry.request_size, entry.request_crc)
    }

    /// Read response data for an interaction
    ///
    /// # Errors
    ///
    /// Returns error if offset is invalid or the data fails its checksum
    pub fn read_response(&self, entry: &InteractionEntry) -> Result<&[u8]> {
        self.read_checked(entry.response_offset, entry.response_size, entry.response_crc)
    }

    fn read_checked(&self, offset: u64, size: u32, expected_crc: u32) -> Result<&[u8]> {
        let end = offset
            .checked_add(u64::from(size))
            .filter(|&end| offset >= self.header.data_offset && end <= self.data_end);
        let Some(end) = end else {
            return Err(ReelError::InvalidFormat(format!(
                "Record at offset {offset} ({size} bytes) lies outside the data section"
            )));
        };

        // Bounded by the mapped length, checked in `open`
        let data = &self.mmap[offset as usize..end as usize];
        let actual = crc32fast::hash(data);
        if actual != expected_crc {
            return Err(ReelError::CorruptedData {
                offset,
                expected: expected_crc,
                actual,
            });
        }

        Ok(data)
    }
}
