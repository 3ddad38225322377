//! Configuration types for Reel

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ReelError, Result};

/// Operating mode, fixed for the lifetime of a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Forward requests to their destination and capture each interaction
    Recording,
    /// Serve requests from recorded interactions without network access
    Replaying,
}

impl Mode {
    /// Check if mode is Recording
    #[must_use]
    pub fn is_recording(&self) -> bool {
        matches!(self, Mode::Recording)
    }

    /// Check if mode is Replaying
    #[must_use]
    pub fn is_replaying(&self) -> bool {
        matches!(self, Mode::Replaying)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Recording => f.write_str("recording"),
            Mode::Replaying => f.write_str("replaying"),
        }
    }
}

/// Matching policy used to find a recorded interaction while replaying
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// Method and URL must be equal
    #[default]
    MethodUrl,
    /// Method, normalized URL and body fingerprint must be equal
    Fingerprint,
}

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Directory holding cassette files
    #[serde(default = "default_cassette_dir")]
    pub cassette_dir: PathBuf,
    /// Matching policy for replay
    #[serde(default)]
    pub matcher: MatcherKind,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_cassette_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            cassette_dir: default_cassette_dir(),
            matcher: MatcherKind::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Maximum response body size in bytes
    pub max_response_size: usize,
    /// Maximum headers per request
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 16 * 1024 * 1024,   // 16 MB
            max_response_size: 256 * 1024 * 1024, // 256 MB
            max_headers: 128,
        }
    }
}

impl RecorderConfig {
    /// Create a configuration storing cassettes under `cassette_dir`
    #[must_use]
    pub fn with_cassette_dir(cassette_dir: impl Into<PathBuf>) -> Self {
        Self {
            cassette_dir: cassette_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReelError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ReelError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.cassette_dir.as_os_str().is_empty() {
            return Err(ReelError::ConfigError(
                "cassette_dir cannot be empty".to_string(),
            ));
        }

        let limits = [
            ("max_request_size", self.limits.max_request_size),
            ("max_response_size", self.limits.max_response_size),
            ("max_headers", self.limits.max_headers),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ReelError::ConfigError(format!("{name} must be > 0")));
            }
        }

        // Stored records carry u32 lengths
        let max_stored = u32::MAX as usize;
        for (name, value) in &limits[..2] {
            if *value > max_stored {
                return Err(ReelError::ConfigError(format!(
                    "{name} must be <= {max_stored}"
                )));
            }
        }

        Ok(())
    }
}
