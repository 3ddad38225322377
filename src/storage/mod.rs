//! Binary storage format for cassettes

mod codec;
mod format;
mod reader;
mod writer;

pub use codec::{decode_request, decode_response, encode_request, encode_response};
pub use format::{
    FileHeader, InteractionEntry, FILE_MAGIC, FILE_VERSION, HEADER_SIZE, INDEX_ENTRY_SIZE,
    MAX_INTERACTIONS,
};
pub use reader::CassetteReader;
pub use writer::CassetteWriter;

use crate::Result;

/// Validate cassette file magic and version
///
/// # Errors
///
/// Returns error if magic or version is invalid
pub fn validate_header(header: &FileHeader) -> Result<()> {
    if header.magic != FILE_MAGIC {
        return Err(crate::ReelError::InvalidFormat(format!(
            "Invalid magic bytes: expected {:?}, got {:?}",
            FILE_MAGIC, header.magic
        )));
    }

    if header.version != FILE_VERSION {
        return Err(crate::ReelError::InvalidFormat(format!(
            "Unsupported version: {}, expected {}",
            header.version, FILE_VERSION
        )));
    }

    Ok(())
}
