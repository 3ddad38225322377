//! Recorder lifecycle
//!
//! A [`Recorder`] owns one cassette. Its mode is fixed at creation: if the
//! cassette file exists it is loaded and every request is replayed from it,
//! otherwise requests go to their real destination and are recorded. The
//! [`Transport`] handed out by [`Recorder::transport`] is what a client
//! installs to route its requests through the recorder.

mod capture;
mod duplicate;
mod tee;
mod transport;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::cassette::{cassette_exists, cassette_path, validate_cassette_name, Cassette, Matcher};
use crate::config::{Mode, RecorderConfig};
use crate::network::{HttpClient, Upstream};
use crate::Result;

pub use capture::{capture, SharedCassette};
pub use duplicate::{dump_request, parse_form, DuplicateRequest};
pub use tee::{BodySink, TeeBody};
pub use transport::{synthesize_response, Synthesized, Transport};

/// Records HTTP interactions onto a cassette, or replays them from one
pub struct Recorder<U = HttpClient> {
    cassette: SharedCassette,
    path: PathBuf,
    transport: Transport<U>,
}

impl Recorder {
    /// Create a recorder for cassette `name` with default configuration
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid or an existing cassette fails to
    /// load
    pub fn create(name: &str) -> Result<Self> {
        Self::builder(name).build()
    }

    /// Start configuring a recorder for cassette `name`
    #[must_use]
    pub fn builder(name: &str) -> RecorderBuilder {
        RecorderBuilder {
            name: name.to_string(),
            config: RecorderConfig::default(),
            upstream: HttpClient::new(),
            matcher: None,
        }
    }
}

impl<U: Upstream> Recorder<U> {
    /// Operating mode, fixed for the recorder's lifetime
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.transport.mode()
    }

    /// Transport routing requests through this recorder
    #[must_use]
    pub fn transport(&self) -> Transport<U> {
        self.transport.clone()
    }

    /// Path of the cassette file
    #[must_use]
    pub fn cassette_path(&self) -> &Path {
        &self.path
    }

    /// Number of interactions currently held by the cassette
    pub async fn interaction_count(&self) -> usize {
        self.cassette.lock().await.len()
    }

    /// Finish the session
    ///
    /// A recording session saves its cassette. Interactions stay in memory,
    /// so a failed save can be retried. A replaying session performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns error if the cassette cannot be saved
    pub async fn stop(&self) -> Result<()> {
        match self.mode() {
            Mode::Replaying => Ok(()),
            Mode::Recording => self.cassette.lock().await.save(),
        }
    }
}

impl<U> std::fmt::Debug for Recorder<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Recorder`]
pub struct RecorderBuilder<U = HttpClient> {
    name: String,
    config: RecorderConfig,
    upstream: U,
    matcher: Option<Arc<dyn Matcher>>,
}

impl<U: Upstream> RecorderBuilder<U> {
    /// Use `config` instead of the default configuration
    #[must_use]
    pub fn config(mut self, config: RecorderConfig) -> Self {
        self.config = config;
        self
    }

    /// Forward recorded requests through `upstream`
    #[must_use]
    pub fn upstream<V: Upstream>(self, upstream: V) -> RecorderBuilder<V> {
        RecorderBuilder {
            name: self.name,
            config: self.config,
            upstream,
            matcher: self.matcher,
        }
    }

    /// Replay with `matcher`, overriding the configured matching policy
    #[must_use]
    pub fn matcher(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Create the recorder
    ///
    /// # Errors
    ///
    /// Returns error if the configuration or name is invalid, or an existing
    /// cassette fails to load
    pub fn build(self) -> Result<Recorder<U>> {
        self.config.validate()?;
        validate_cassette_name(&self.name)?;

        let path = cassette_path(&self.config.cassette_dir, &self.name);
        let (cassette, mode) = if cassette_exists(&path) {
            (Cassette::load(&self.name, &path)?, Mode::Replaying)
        } else {
            (Cassette::new(&self.name, &path), Mode::Recording)
        };

        let matcher = self
            .matcher
            .unwrap_or_else(|| self.config.matcher.into());
        let cassette = Arc::new(Mutex::new(cassette.with_matcher(matcher)));

        info!(
            "Recorder '{}' {} with cassette {}",
            self.name,
            mode,
            path.display()
        );

        let transport = Transport::new(
            Arc::clone(&cassette),
            mode,
            Arc::new(self.upstream),
            self.config.limits,
        );

        Ok(Recorder {
            cassette,
            path,
            transport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::{Interaction, RecordedRequest, RecordedResponse};
    use crate::ReelError;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> RecorderConfig {
        RecorderConfig::with_cassette_dir(dir.path())
    }

    fn interaction(url: &str) -> Interaction {
        Interaction {
            request: RecordedRequest {
                method: "GET".to_string(),
                url: url.to_string(),
                ..RecordedRequest::default()
            },
            response: RecordedResponse {
                status: "200 OK".to_string(),
                code: 200,
                headers: vec![],
                body: b"ok".to_vec(),
            },
        }
    }

    #[tokio::test]
    async fn test_absent_cassette_records() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::builder("fresh").config(config(&dir)).build().unwrap();

        assert_eq!(recorder.mode(), Mode::Recording);
        assert_eq!(recorder.transport().mode(), Mode::Recording);
        assert_eq!(recorder.cassette_path(), dir.path().join("fresh.cassette"));
        assert_eq!(recorder.interaction_count().await, 0);
        assert!(!recorder.cassette_path().exists());
    }

    #[tokio::test]
    async fn test_stop_persists_and_next_recorder_replays() {
        let dir = TempDir::new().unwrap();

        let recorder = Recorder::builder("roundtrip").config(config(&dir)).build().unwrap();
        recorder
            .cassette
            .lock()
            .await
            .append(interaction("http://example.test/a"));
        recorder.stop().await.unwrap();
        assert!(recorder.cassette_path().exists());

        let replay = Recorder::builder("roundtrip").config(config(&dir)).build().unwrap();
        assert_eq!(replay.mode(), Mode::Replaying);
        assert_eq!(replay.interaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_stop_in_nested_directory() {
        let dir = TempDir::new().unwrap();
        let nested = RecorderConfig::with_cassette_dir(dir.path().join("a/b"));

        let recorder = Recorder::builder("nested").config(nested).build().unwrap();
        recorder.stop().await.unwrap();

        assert!(dir.path().join("a/b/nested.cassette").exists());
    }

    #[tokio::test]
    async fn test_replay_stop_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::builder("still").config(config(&dir)).build().unwrap();
        recorder.stop().await.unwrap();

        let before = std::fs::read(recorder.cassette_path()).unwrap();
        let replay = Recorder::builder("still").config(config(&dir)).build().unwrap();
        assert_eq!(replay.mode(), Mode::Replaying);

        replay.stop().await.unwrap();
        replay.stop().await.unwrap();

        assert_eq!(std::fs::read(replay.cassette_path()).unwrap(), before);
        assert!(!dir.path().join("still.cassette.tmp").exists());
    }

    #[test]
    fn test_corrupt_cassette_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.cassette"), b"not a cassette").unwrap();

        let result = Recorder::builder("broken").config(config(&dir)).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        for name in ["", "../escape", "a/b", ".hidden"] {
            let result = Recorder::builder(name).config(config(&dir)).build();
            assert!(matches!(result, Err(ReelError::InvalidCassetteName(_))));
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = RecorderConfig::default();
        config.limits.max_headers = 0;

        let result = Recorder::builder("limits").config(config).build();
        assert!(matches!(result, Err(ReelError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_explicit_matcher_overrides_config() {
        let dir = TempDir::new().unwrap();
        let recorder = Recorder::builder("matching").config(config(&dir)).build().unwrap();
        recorder
            .cassette
            .lock()
            .await
            .append(interaction("http://example.test/a"));
        recorder.stop().await.unwrap();

        let any: Arc<dyn Matcher> = Arc::new(|_: &RecordedRequest, _: &RecordedRequest| true);
        let replay = Recorder::builder("matching")
            .config(config(&dir))
            .matcher(any)
            .build()
            .unwrap();

        let lookup = RecordedRequest {
            method: "DELETE".to_string(),
            url: "http://elsewhere.test/".to_string(),
            ..RecordedRequest::default()
        };
        assert!(replay.cassette.lock().await.find_match(&lookup).is_some());
    }
}
