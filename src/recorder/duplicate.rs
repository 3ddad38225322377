//! Independent request copies for form parsing
//!
//! A recorded request is dumped to its HTTP/1.1 wire form and parsed back
//! into a [`DuplicateRequest`], so reading form fields never touches the
//! body that is forwarded upstream.

use hyper::body::Bytes;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST};
use hyper::http::request::Parts;
use hyper::Method;

use crate::{ReelError, Result};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A request parsed back from its wire form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRequest {
    /// Request method
    pub method: String,
    /// Request target from the request line
    pub target: String,
    /// Headers in wire order; values are raw bytes
    pub headers: Vec<(String, Vec<u8>)>,
    /// Body bytes
    pub body: Vec<u8>,
}

/// Serialize request head and body to HTTP/1.1 wire form
///
/// A `Host` header is written from the URI authority when the request has
/// none, and `Content-Length` is written for non-empty bodies.
#[must_use]
pub fn dump_request(parts: &Parts, body: &Bytes) -> Vec<u8> {
    let target = parts
        .uri
        .path_and_query()
        .map_or("/", |path_and_query| path_and_query.as_str());

    let mut head = format!("{} {target} HTTP/1.1\r\n", parts.method);

    if !parts.headers.contains_key(HOST) {
        if let Some(authority) = parts.uri.authority() {
            head.push_str(&format!("Host: {authority}\r\n"));
        }
    }

    let mut wire = head.into_bytes();
    for (name, value) in &parts.headers {
        if name == CONTENT_LENGTH {
            continue;
        }
        wire.extend_from_slice(name.as_str().as_bytes());
        wire.extend_from_slice(b": ");
        wire.extend_from_slice(value.as_bytes());
        wire.extend_from_slice(b"\r\n");
    }
    if !body.is_empty() {
        wire.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    wire.extend_from_slice(b"\r\n");
    wire.extend_from_slice(body);

    wire
}

impl DuplicateRequest {
    /// Parse a request from its wire form
    ///
    /// Header values may carry any byte allowed in a header field, including
    /// obs-text.
    ///
    /// # Errors
    ///
    /// Returns error if the request line or a header line is malformed, or
    /// the body is shorter than its `Content-Length`
    pub fn parse(wire: &[u8]) -> Result<Self> {
        let head_end = wire
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .ok_or_else(|| ReelError::Serialization("Request head is not terminated".to_string()))?;

        let mut lines = wire[..head_end].split(|&b| b == b'\n').map(trim_cr);

        let request_line = lines.next().unwrap_or_default();
        let request_line = std::str::from_utf8(request_line).map_err(|_| {
            ReelError::Serialization(format!(
                "Malformed request line: {:?}",
                String::from_utf8_lossy(request_line)
            ))
        })?;
        let mut parts = request_line.split(' ');
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ReelError::Serialization(format!(
                "Malformed request line: {request_line:?}"
            )));
        };
        if method.is_empty() || !version.starts_with("HTTP/") {
            return Err(ReelError::Serialization(format!(
                "Malformed request line: {request_line:?}"
            )));
        }

        let mut headers = Vec::new();
        for line in lines {
            let malformed = || {
                ReelError::Serialization(format!(
                    "Malformed header line: {:?}",
                    String::from_utf8_lossy(line)
                ))
            };
            let colon = line.iter().position(|&b| b == b':').ok_or_else(malformed)?;
            let name = std::str::from_utf8(&line[..colon]).map_err(|_| malformed())?;
            headers.push((name.trim().to_string(), trim_whitespace(&line[colon + 1..]).to_vec()));
        }

        let mut request = Self {
            method: method.to_string(),
            target: target.to_string(),
            headers,
            body: Vec::new(),
        };

        let body = &wire[head_end + 4..];
        let body_len = match request.header(CONTENT_LENGTH.as_str()) {
            Some(value) => std::str::from_utf8(value)
                .ok()
                .and_then(|value| value.parse::<usize>().ok())
                .ok_or_else(|| {
                    ReelError::Serialization(format!(
                        "Invalid Content-Length {:?}",
                        String::from_utf8_lossy(value)
                    ))
                })?,
            None => 0,
        };
        if body.len() < body_len {
            return Err(ReelError::Serialization(format!(
                "Body truncated: expected {body_len} bytes, got {}",
                body.len()
            )));
        }
        request.body = body[..body_len].to_vec();

        Ok(request)
    }

    /// First value of header `name` (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_slice())
    }

    /// Url-encoded form fields carried in the body
    ///
    /// Only POST, PUT and PATCH requests with an
    /// `application/x-www-form-urlencoded` content type carry form fields;
    /// every other request yields an empty list. Bytes that do not decode to
    /// UTF-8 are replaced with U+FFFD.
    #[must_use]
    pub fn post_form(&self) -> Vec<(String, String)> {
        let carries_form = [Method::POST, Method::PUT, Method::PATCH]
            .iter()
            .any(|m| m.as_str() == self.method);
        if !carries_form {
            return Vec::new();
        }

        let media_type = self
            .header(CONTENT_TYPE.as_str())
            .and_then(|value| value.split(|&b| b == b';').next())
            .map(|value| trim_whitespace(value).to_ascii_lowercase());
        if media_type.as_deref() != Some(FORM_CONTENT_TYPE.as_bytes()) {
            return Vec::new();
        }

        parse_form(&self.body)
    }
}

/// Decode an url-encoded form
///
/// Decoding never fails: invalid UTF-8 is replaced with U+FFFD.
#[must_use]
pub fn parse_form(body: &[u8]) -> Vec<(String, String)> {
    body.split(|&b| b == b'&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = match pair.iter().position(|&b| b == b'=') {
                Some(eq) => (&pair[..eq], &pair[eq + 1..]),
                None => (pair, &pair[pair.len()..]),
            };
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(component: &[u8]) -> String {
    let spaced: Vec<u8> = component
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    String::from_utf8_lossy(&urlencoding::decode_binary(&spaced)).into_owned()
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim_whitespace(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if !first.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !last.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    bytes
}
