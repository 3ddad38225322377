//! Body buffering and request validation

use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::header::HeaderMap;

use crate::{ReelError, Result};

use super::BoxError;

/// Reject requests carrying more than `max_headers` headers
///
/// # Errors
///
/// Returns error if there are too many headers
pub fn validate_request<B>(request: &hyper::Request<B>, max_headers: usize) -> Result<()> {
    let count = request.headers().len();
    if count > max_headers {
        return Err(ReelError::TooManyHeaders {
            count,
            limit: max_headers,
        });
    }

    Ok(())
}

/// Read a whole body with size limit
///
/// # Errors
///
/// Returns error if body is too large or read fails
pub async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
where
    B: hyper::body::Body,
    B::Error: Into<BoxError>,
{
    if let Some(upper) = body.size_hint().upper() {
        if upper > max_size as u64 {
            return Err(ReelError::DataTooLarge {
                size: upper as usize,
                limit: max_size,
            });
        }
    }

    let collected = body.collect().await.map_err(|e| {
        let e: BoxError = e.into();
        ReelError::Serialization(format!("Failed to read body: {e}"))
    })?;

    let bytes = collected.to_bytes();

    if bytes.len() > max_size {
        return Err(ReelError::DataTooLarge {
            size: bytes.len(),
            limit: max_size,
        });
    }

    Ok(bytes)
}

/// Flatten a header map into ordered name/value pairs
///
/// Values are converted lossily: bytes that are not UTF-8 become U+FFFD, so
/// such a value is not replayed byte for byte.
#[must_use]
pub fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}
