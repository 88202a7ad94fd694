//! # Application Configuration
//!
//! TOML configuration for the binary: the pipeline handed to the driver
//! and where checkpoints are stored.
//!
//! ```toml
//! [store]
//! path = "theorist.db"
//!
//! [pipeline]
//! primary_parse = "full"
//! abort_documents = []
//!
//! [[pipeline.stages]]
//! stage = "tokens"
//! beam_width = 1
//! mode = "required"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use theorist_core::{PipelineConfig, TheoristError};

/// Maximum configuration file size (1 MB).
pub const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Default location of the checkpoint database.
pub const DEFAULT_STATE_PATH: &str = "theorist.db";

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Checkpoint store section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_PATH)
}

impl AppConfig {
    /// Parse and validate configuration text.
    pub fn parse(text: &str) -> Result<Self, TheoristError> {
        let config: AppConfig = toml::from_str(text)
            .map_err(|e| TheoristError::InvalidConfig(format!("TOML parse error: {}", e)))?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, TheoristError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            TheoristError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(TheoristError::InvalidConfig(format!(
                "config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            TheoristError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let config = Self::parse(&text)?;
        tracing::debug!(
            path = %path.display(),
            stages = config.pipeline.stages.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Load `path` when given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, TheoristError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
