//! Request fingerprinting for deterministic hash generation

use hyper::Uri;
use sha2::{Digest, Sha256};

use crate::cassette::RecordedRequest;

/// Compute SHA-256 fingerprint of a request
///
/// The fingerprint includes:
/// 1. Method (uppercase normalized)
/// 2. URL (scheme and host lowercased, path normalized)
/// 3. Query parameters (sorted)
/// 4. Body
///
/// Headers are not part of the fingerprint.
#[must_use]
pub fn fingerprint_request(request: &RecordedRequest) -> [u8; 32] {
    let mut hasher = Sha256::new();

    // 1. Method (uppercase normalized)
    let method = request.method.to_uppercase();
    hasher.update((method.len() as u32).to_le_bytes());
    hasher.update(method.as_bytes());

    // 2. URL without query
    let (base, mut query) = split_url(&request.url);
    hasher.update((base.len() as u32).to_le_bytes());
    hasher.update(base.as_bytes());

    // 3. Query parameters (sorted)
    query.sort();
    hasher.update((query.len() as u32).to_le_bytes());
    for (key, value) in &query {
        hasher.update((key.len() as u32).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u32).to_le_bytes());
        hasher.update(value.as_bytes());
    }

    // 4. Body
    hasher.update((request.body.len() as u32).to_le_bytes());
    hasher.update(&request.body);

    hasher.finalize().into()
}

/// Split a URL into its normalized base and its query pairs
fn split_url(url: &str) -> (String, Vec<(String, String)>) {
    let Ok(uri) = url.trim().parse::<Uri>() else {
        return (url.trim().to_string(), Vec::new());
    };

    let mut base = String::new();
    if let Some(scheme) = uri.scheme_str() {
        base.push_str(&scheme.to_ascii_lowercase());
        base.push_str("://");
    }
    if let Some(authority) = uri.authority() {
        base.push_str(&authority.as_str().to_ascii_lowercase());
    }
    base.push_str(&normalize_path(uri.path()));

    let query = uri
        .query()
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((key, value)) => (key.to_string(), value.to_string()),
                    None => (pair.to_string(), String::new()),
                })
                .collect()
        })
        .unwrap_or_default();

    (base, query)
}

/// Normalize a URL path
fn normalize_path(path: &str) -> String {
    // Remove leading/trailing whitespace
    let trimmed = path.trim();

    // Ensure leading slash
    if trimmed.is_empty() || !trimmed.starts_with('/') {
        format!("/{trimmed}")
    } else {
        trimmed.to_string()
    }
}
