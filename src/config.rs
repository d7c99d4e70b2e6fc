//! Runtime configuration, loaded from a TOML file.
//!
//! ```toml
//! [session]
//! receive_buffer_capacity = 1048576
//! send_buffer_capacity = 1048576
//! default_segment_size = 1024
//!
//! [capture]
//! enabled = true
//! path = "capture.pcap"
//! append = false
//! size_limit = 100000000000
//! ```
//!
//! Every field is optional and falls back to [`Config::default`].

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub capture: CaptureConfig,
}

/// Buffer bounds and segmenting for every session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bytes from the destination waiting for the client beyond which the destination is not read. The buffer
    /// itself never drops data.
    pub receive_buffer_capacity: usize,
    /// Bytes from the client waiting to be delivered to the destination.
    pub send_buffer_capacity: usize,
    /// Payload size of segments pushed to the client when no MSS was negotiated.
    pub default_segment_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            receive_buffer_capacity: 1 << 20,
            send_buffer_capacity: 1 << 20,
            default_segment_size: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub enabled: bool,
    pub path: PathBuf,
    /// Keep the records of an existing file instead of truncating it.
    pub append: bool,
    /// Bytes after which the writer refuses further records.
    pub size_limit: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            enabled: false,
            path: PathBuf::from("capture.pcap"),
            append: false,
            size_limit: crate::pcap::writer::DEFAULT_SIZE_LIMIT,
        }
    }
}

impl Config {
    /// Read and validate the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.receive_buffer_capacity == 0 {
            return Err(ConfigError::Invalid("session.receive_buffer_capacity must be positive".to_string()));
        }
        if self.session.send_buffer_capacity == 0 {
            return Err(ConfigError::Invalid("session.send_buffer_capacity must be positive".to_string()));
        }
        if self.session.default_segment_size == 0 {
            return Err(ConfigError::Invalid("session.default_segment_size must be positive".to_string()));
        }
        Ok(())
    }
}
