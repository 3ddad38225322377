//! Cassettes: named, ordered collections of recorded interactions

mod matcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::fingerprint::fingerprint_request;
use crate::storage::{self, CassetteReader, CassetteWriter};
use crate::{ReelError, Result};

pub use matcher::{FingerprintMatcher, Matcher, MethodUrlMatcher};

/// File extension of cassette files
pub const CASSETTE_EXTENSION: &str = "cassette";

/// Request half of a recorded interaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: String,
    /// Absolute request URL
    pub url: String,
    /// Request headers, in order, as sent by the caller
    ///
    /// Values that are not UTF-8 are stored lossily.
    pub headers: Vec<(String, String)>,
    /// Request body bytes
    pub body: Vec<u8>,
    /// Url-encoded form fields parsed from the body
    pub form: Vec<(String, String)>,
}

/// Response half of a recorded interaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedResponse {
    /// Status line, e.g. "200 OK"
    pub status: String,
    /// Status code
    pub code: u16,
    /// Response headers; values that are not UTF-8 are stored lossily
    pub headers: Vec<(String, String)>,
    /// Response body bytes
    pub body: Vec<u8>,
}

/// One completed request/response exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interaction {
    /// Recorded request
    pub request: RecordedRequest,
    /// Recorded response
    pub response: RecordedResponse,
}

/// Path of the cassette called `name` inside `dir`
#[must_use]
pub fn cassette_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{CASSETTE_EXTENSION}"))
}

/// Check whether a cassette has been stored at `path`
#[must_use]
pub fn cassette_exists(path: &Path) -> bool {
    path.is_file()
}

/// An ordered sequence of interactions backed by a cassette file
pub struct Cassette {
    name: String,
    path: PathBuf,
    interactions: Vec<Arc<Interaction>>,
    matcher: Arc<dyn Matcher>,
}

impl Cassette {
    /// Create an empty cassette that will be saved to `path`
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            interactions: Vec::new(),
            matcher: Arc::new(MethodUrlMatcher),
        }
    }

    /// Load a cassette from `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, is not a cassette, or any
    /// record fails its checksum or fingerprint
    pub fn load(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let mut cassette = Self::new(name, path);
        let reader = CassetteReader::open(&cassette.path)?;

        for entry in reader.entries_iter() {
            let request = storage::decode_request(reader.read_request(&entry)?)?;
            let response = storage::decode_response(reader.read_response(&entry)?)?;

            if fingerprint_request(&request) != entry.request_hash {
                return Err(ReelError::InvalidFormat(format!(
                    "Fingerprint mismatch for {} {} at offset {}",
                    request.method, request.url, entry.request_offset
                )));
            }

            cassette
                .interactions
                .push(Arc::new(Interaction { request, response }));
        }

        info!(
            "Loaded cassette '{}': {} interactions",
            cassette.name,
            cassette.interactions.len()
        );

        Ok(cassette)
    }

    /// Replace the matching policy
    #[must_use]
    pub fn with_matcher(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    /// Cassette name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cassette file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded interactions, in append order
    #[must_use]
    pub fn interactions(&self) -> &[Arc<Interaction>] {
        &self.interactions
    }

    /// Number of interactions
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Check if the cassette holds no interactions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Append an interaction; it is persisted on the next [`Cassette::save`]
    pub fn append(&mut self, interaction: Interaction) -> Arc<Interaction> {
        let interaction = Arc::new(interaction);
        self.interactions.push(Arc::clone(&interaction));
        interaction
    }

    /// Find the first recorded interaction matching `request`
    #[must_use]
    pub fn find_match(&self, request: &RecordedRequest) -> Option<Arc<Interaction>> {
        self.interactions
            .iter()
            .find(|interaction| self.matcher.matches(request, &interaction.request))
            .cloned()
    }

    /// Persist the cassette to its path
    ///
    /// The file is written next to its destination and renamed into place, so
    /// a failed save leaves any previous file untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self
            .path
            .with_extension(format!("{CASSETTE_EXTENSION}.tmp"));

        let result = self.write_to(&tmp_path);
        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
        std::fs::rename(&tmp_path, &self.path)?;

        info!(
            "Saved cassette '{}': {} interactions to {}",
            self.name,
            self.interactions.len(),
            self.path.display()
        );

        Ok(())
    }

    fn write_to(&self, path: &Path) -> Result<()> {
        let mut writer = CassetteWriter::create(
            path,
            cassette_id(&self.name),
            self.interactions.len() as u64,
        )?;

        for interaction in &self.interactions {
            let request_hash = fingerprint_request(&interaction.request);
            writer.append_interaction(
                request_hash,
                &storage::encode_request(&interaction.request)?,
                &storage::encode_response(&interaction.response)?,
            )?;
            debug!(
                "Stored interaction: {} {} ({})",
                interaction.request.method,
                interaction.request.url,
                hex::encode(&request_hash[..8])
            );
        }

        writer.finalize()
    }
}

impl std::fmt::Debug for Cassette {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cassette")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("interactions", &self.interactions.len())
            .finish_non_exhaustive()
    }
}

/// Generate a cassette ID from its name
fn cassette_id(name: &str) -> [u8; 32] {
    Sha256::digest(name.as_bytes()).into()
}

/// Validate a cassette name
///
/// # Errors
///
/// Returns error if cassette name is invalid
pub fn validate_cassette_name(name: &str) -> Result<()> {
    // Check length
    if name.is_empty() {
        return Err(ReelError::InvalidCassetteName(
            "Cassette name cannot be empty".to_string(),
        ));
    }

    if name.len() > 255 {
        return Err(ReelError::InvalidCassetteName(format!(
            "Cassette name too long: {} > 255",
            name.len()
        )));
    }

    // Check for path separators
    if name.contains('/') || name.contains('\\') {
        return Err(ReelError::InvalidCassetteName(
            "Cassette name cannot contain path separators".to_string(),
        ));
    }

    // Check for hidden files
    if name.starts_with('.') {
        return Err(ReelError::InvalidCassetteName(
            "Cassette name cannot start with dot".to_string(),
        ));
    }

    // Check for null bytes
    if name.contains('\0') {
        return Err(ReelError::InvalidCassetteName(
            "Cassette name cannot contain null bytes".to_string(),
        ));
    }

    // Check for path traversal
    if name.contains("..") {
        return Err(ReelError::InvalidCassetteName(
            "Cassette name cannot contain '..'".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn interaction(method: &str, url: &str, body: &str) -> Interaction {
        Interaction {
            request: RecordedRequest {
                method: method.to_string(),
                url: url.to_string(),
                headers: vec![("accept".to_string(), "*/*".to_string())],
                ..RecordedRequest::default()
            },
            response: RecordedResponse {
                status: "200 OK".to_string(),
                code: 200,
                headers: vec![("content-type".to_string(), "text/plain".to_string())],
                body: body.as_bytes().to_vec(),
            },
        }
    }

    fn lookup(method: &str, url: &str) -> RecordedRequest {
        RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            ..RecordedRequest::default()
        }
    }

    #[test]
    fn test_append_keeps_order_without_dedup() {
        let mut cassette = Cassette::new("order", "order.cassette");
        cassette.append(interaction("GET", "http://example.test/a", "first"));
        cassette.append(interaction("GET", "http://example.test/a", "second"));
        cassette.append(interaction("GET", "http://example.test/b", "third"));

        assert_eq!(cassette.len(), 3);
        let bodies: Vec<_> = cassette
            .interactions()
            .iter()
            .map(|i| i.response.body.clone())
            .collect();
        assert_eq!(bodies, vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()]);
    }

    #[test]
    fn test_find_match_returns_first() {
        let mut cassette = Cassette::new("match", "match.cassette");
        cassette.append(interaction("GET", "http://example.test/a", "first"));
        cassette.append(interaction("GET", "http://example.test/a", "second"));

        let found = cassette
            .find_match(&lookup("GET", "http://example.test/a"))
            .unwrap();
        assert_eq!(found.response.body, b"first");

        assert!(cassette
            .find_match(&lookup("GET", "http://example.test/missing"))
            .is_none());
    }

    #[test]
    fn test_custom_matcher() {
        let any_get = |req: &RecordedRequest, _: &RecordedRequest| req.method == "GET";
        let mut cassette = Cassette::new("custom", "custom.cassette").with_matcher(Arc::new(any_get));
        cassette.append(interaction("GET", "http://example.test/a", "ok"));

        assert!(cassette
            .find_match(&lookup("GET", "http://elsewhere.test/"))
            .is_some());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = cassette_path(&temp_dir.path().join("nested/dir"), "roundtrip");

        let mut cassette = Cassette::new("roundtrip", &path);
        let mut posted = interaction("POST", "http://example.test/form", "created");
        posted.request.body = b"a=1&b=two".to_vec();
        posted.request.form = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "two".to_string()),
        ];
        cassette.append(interaction("GET", "http://example.test/a", "ok"));
        cassette.append(posted.clone());
        cassette.save().unwrap();

        assert!(cassette_exists(&path));
        assert!(!path.with_extension("cassette.tmp").exists());

        let loaded = Cassette::load("roundtrip", &path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(*loaded.interactions()[1], posted);
    }

    #[test]
    fn test_save_empty_cassette() {
        let temp_dir = TempDir::new().unwrap();
        let path = cassette_path(temp_dir.path(), "empty");

        Cassette::new("empty", &path).save().unwrap();

        let loaded = Cassette::load("empty", &path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = cassette_path(temp_dir.path(), "absent");

        assert!(!cassette_exists(&path));
        assert!(matches!(
            Cassette::load("absent", &path),
            Err(ReelError::Io(_))
        ));
    }

    #[test]
    fn test_cassette_path() {
        assert_eq!(
            cassette_path(Path::new("fixtures"), "github"),
            PathBuf::from("fixtures/github.cassette")
        );
    }

    #[test]
    fn test_validate_cassette_name() {
        assert!(validate_cassette_name("valid_cassette").is_ok());
        assert!(validate_cassette_name("cassette-123").is_ok());

        assert!(validate_cassette_name("").is_err());
        assert!(validate_cassette_name(".hidden").is_err());
        assert!(validate_cassette_name("fixtures/name").is_err());
        assert!(validate_cassette_name("fixtures\\name").is_err());
        assert!(validate_cassette_name("a..b").is_err());
        assert!(validate_cassette_name("a\0b").is_err());
        assert!(validate_cassette_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_cassette_id_stable() {
        assert_eq!(cassette_id("a"), cassette_id("a"));
        assert_ne!(cassette_id("a"), cassette_id("b"));
    }
}
