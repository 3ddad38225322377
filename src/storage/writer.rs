//! Cassette file writer

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bytemuck::bytes_of;
use crc32fast::Hasher;
use memmap2::MmapMut;

use super::format::{
    stored_len, FileHeader, InteractionEntry, HEADER_SIZE, INDEX_ENTRY_SIZE, MAX_INTERACTIONS,
};
use crate::{ReelError, Result};

/// Extra space reserved whenever the data section has to grow
const GROWTH_BYTES: u64 = 1024 * 1024;

/// Writer for cassette files
pub struct CassetteWriter {
    file: File,
    mmap: MmapMut,
    header: FileHeader,
    capacity: u64,
    index_offset: usize,
}

impl CassetteWriter {
    /// Create a new cassette file with room for `capacity` index entries
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be created or mapped, or if `capacity`
    /// exceeds [`MAX_INTERACTIONS`]
    pub fn create(path: &Path, cassette_id: [u8; 32], capacity: u64) -> Result<Self> {
        if capacity > MAX_INTERACTIONS {
            return Err(ReelError::InvalidFormat(format!(
                "Cassette too large: {capacity} interactions > {MAX_INTERACTIONS}"
            )));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        // Header + index; data is appended after the index
        let data_offset = (HEADER_SIZE + INDEX_ENTRY_SIZE * capacity as usize) as u64;
        file.set_len(data_offset)?;

        // SAFETY: the file was just created by us and is not shared
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        let mut header = FileHeader::default();
        header.cassette_id = cassette_id;
        header.data_offset = data_offset;
        header.created_at = now_nanos();

        mmap[..HEADER_SIZE].copy_from_slice(bytes_of(&header));

        Ok(Self {
            file,
            mmap,
            header,
            capacity,
            index_offset: HEADER_SIZE,
        })
    }

    /// Append an encoded interaction to the cassette
    ///
    /// # Errors
    ///
    /// Returns error if write fails, the index is full, or a record is too
    /// large for its size field
    pub fn append_interaction(
        &mut self,
        request_hash: [u8; 32],
        request_data: &[u8],
        response_data: &[u8],
    ) -> Result<()> {
        if self.header.interaction_count >= self.capacity {
            return Err(ReelError::InvalidFormat(format!(
                "Cassette index full: {} entries",
                self.capacity
            )));
        }

        let request_size = stored_len(request_data.len())?;
        let response_size = stored_len(response_data.len())?;
        let data_offset = self.data_end()?;

        // Grow file if needed
        let needed_size = data_offset + u64::from(request_size) + u64::from(response_size);
        if needed_size > self.file.metadata()?.len() {
            self.mmap.flush()?;
            self.file.set_len(needed_size + GROWTH_BYTES)?;
            // SAFETY: the file is still exclusively ours; the old map is dropped here
            self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        }

        let entry = InteractionEntry {
            request_hash,
            request_offset: data_offset,
            response_offset: data_offset + u64::from(request_size),
            recorded_at: now_nanos(),
            request_size,
            response_size,
            request_crc: crc32fast::hash(request_data),
            response_crc: crc32fast::hash(response_data),
            reserved: [0; 32],
            reserved_tail: [0; 24],
        };

        // Write index entry
        let entry_offset = self.index_offset;
        self.mmap[entry_offset..entry_offset + INDEX_ENTRY_SIZE].copy_from_slice(bytes_of(&entry));

        // Write request data
        let request_offset = data_offset as usize;
        self.mmap[request_offset..request_offset + request_data.len()]
            .copy_from_slice(request_data);

        // Write response data
        let response_offset = entry.response_offset as usize;
        self.mmap[response_offset..response_offset + response_data.len()]
            .copy_from_slice(response_data);

        self.header.interaction_count += 1;
        self.header.data_size += u64::from(request_size) + u64::from(response_size);
        self.index_offset += INDEX_ENTRY_SIZE;

        Ok(())
    }

    fn data_end(&self) -> Result<u64> {
        self.header
            .end_offset()
            .ok_or_else(|| ReelError::InvalidFormat("Data section overflows u64".to_string()))
    }

    /// Number of interactions written so far
    #[must_use]
    pub fn interaction_count(&self) -> u64 {
        self.header.interaction_count
    }

    /// Finalize the cassette file
    ///
    /// # Errors
    ///
    /// Returns error if flush fails
    pub fn finalize(mut self) -> Result<()> {
        // Write header first (with CRC as 0)
        self.header.header_crc = 0;
        self.mmap[..HEADER_SIZE].copy_from_slice(bytes_of(&self.header));

        self.header.header_crc = header_crc(&self.mmap[..HEADER_SIZE]);

        // Write final header with CRC
        self.mmap[..HEADER_SIZE].copy_from_slice(bytes_of(&self.header));

        // Flush to disk
        self.mmap.flush()?;

        // Truncate file to actual size
        self.file.set_len(self.data_end()?)?;
        self.file.sync_all()?;

        Ok(())
    }
}

/// CRC32 of a header, skipping the CRC field at bytes 12-15
pub(super) fn header_crc(header_bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&header_bytes[..12]); // magic + version
    hasher.update(&header_bytes[16..HEADER_SIZE]); // rest of header after CRC
    hasher.finalize()
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
