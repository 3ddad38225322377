//! Encoding of request and response records
//!
//! Every record is a flat sequence of length-prefixed fields. Byte strings
//! carry a `u32` length, lists a `u32` count, status codes are a plain `u16`.
//! All integers are little-endian.

use bytes::{Buf, BufMut};

use super::format::stored_len;
use crate::cassette::{RecordedRequest, RecordedResponse};
use crate::{ReelError, Result};

/// Serialize a request for storage
///
/// # Errors
///
/// Returns error if a field or list is too long for its length prefix
pub fn encode_request(request: &RecordedRequest) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(64 + request.url.len() + request.body.len());

    put_bytes(&mut data, request.method.as_bytes())?;
    put_bytes(&mut data, request.url.as_bytes())?;
    put_pairs(&mut data, &request.headers)?;
    put_pairs(&mut data, &request.form)?;
    put_bytes(&mut data, &request.body)?;

    Ok(data)
}

/// Serialize a response for storage
///
/// # Errors
///
/// Returns error if a field or list is too long for its length prefix
pub fn encode_response(response: &RecordedResponse) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(64 + response.body.len());

    data.put_u16_le(response.code);
    put_bytes(&mut data, response.status.as_bytes())?;
    put_pairs(&mut data, &response.headers)?;
    put_bytes(&mut data, &response.body)?;

    Ok(data)
}

/// Deserialize a request from storage
///
/// # Errors
///
/// Returns error if the record is truncated or malformed
pub fn decode_request(mut data: &[u8]) -> Result<RecordedRequest> {
    let method = get_string(&mut data, "method")?;
    let url = get_string(&mut data, "url")?;
    let headers = get_pairs(&mut data, "request header")?;
    let form = get_pairs(&mut data, "form field")?;
    let body = get_bytes(&mut data, "request body")?;
    expect_end(data, "request")?;

    Ok(RecordedRequest {
        method,
        url,
        headers,
        body,
        form,
    })
}

/// Deserialize a response from storage
///
/// # Errors
///
/// Returns error if the record is truncated or malformed
pub fn decode_response(mut data: &[u8]) -> Result<RecordedResponse> {
    if data.remaining() < 2 {
        return Err(ReelError::InvalidFormat("Response too short".to_string()));
    }
    let code = data.get_u16_le();
    let status = get_string(&mut data, "status")?;
    let headers = get_pairs(&mut data, "response header")?;
    let body = get_bytes(&mut data, "response body")?;
    expect_end(data, "response")?;

    Ok(RecordedResponse {
        status,
        code,
        headers,
        body,
    })
}

fn put_bytes(data: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    data.put_u32_le(stored_len(bytes.len())?);
    data.put_slice(bytes);
    Ok(())
}

fn put_pairs(data: &mut Vec<u8>, pairs: &[(String, String)]) -> Result<()> {
    data.put_u32_le(stored_len(pairs.len())?);
    for (name, value) in pairs {
        put_bytes(data, name.as_bytes())?;
        put_bytes(data, value.as_bytes())?;
    }
    Ok(())
}

fn get_bytes(data: &mut &[u8], field: &str) -> Result<Vec<u8>> {
    if data.remaining() < 4 {
        return Err(ReelError::InvalidFormat(format!(
            "Missing {field} length"
        )));
    }
    let len = data.get_u32_le() as usize;

    if data.remaining() < len {
        return Err(ReelError::InvalidFormat(format!(
            "Missing {field}: need {len} bytes, have {}",
            data.remaining()
        )));
    }
    let bytes = data[..len].to_vec();
    data.advance(len);

    Ok(bytes)
}

fn get_string(data: &mut &[u8], field: &str) -> Result<String> {
    let bytes = get_bytes(data, field)?;
    String::from_utf8(bytes)
        .map_err(|e| ReelError::InvalidFormat(format!("Invalid UTF-8 in {field}: {e}")))
}

fn get_pairs(data: &mut &[u8], field: &str) -> Result<Vec<(String, String)>> {
    if data.remaining() < 4 {
        return Err(ReelError::InvalidFormat(format!("Missing {field} count")));
    }
    let count = data.get_u32_le();

    // Each pair takes at least two length prefixes
    let mut pairs = Vec::with_capacity((count as usize).min(data.remaining() / 8));
    for _ in 0..count {
        let name = get_string(data, field)?;
        let value = get_string(data, field)?;
        pairs.push((name, value));
    }

    Ok(pairs)
}

fn expect_end(data: &[u8], record: &str) -> Result<()> {
    if data.is_empty() {
        Ok(())
    } else {
        Err(ReelError::InvalidFormat(format!(
            "{} trailing bytes after {record} record",
            data.len()
        )))
    }
}
