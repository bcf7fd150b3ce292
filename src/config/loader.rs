//! Configuration Loader
//!
//! Layers built-in defaults, an optional configuration file (format chosen by
//! extension) and prefixed environment variables, then validates the result.

use config::{Config, Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::BridgeConfig;
use crate::constants::defaults;
use crate::error::Result;

/// Builds a [`BridgeConfig`] from layered sources
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            file: None,
            env_prefix: defaults::ENV_PREFIX.to_string(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `path`; the file must exist
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Environment prefix, e.g. `PULL_BRIDGE` reads `PULL_BRIDGE_BATCHING_SIZE`
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(&self) -> Result<BridgeConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&BridgeConfig::default())?);

        if let Some(path) = &self.file {
            debug!(file = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: BridgeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        debug!(
            config = %serde_json::to_string(&config).unwrap_or_else(|_| "[serialization error]".to_string()),
            "Configuration loaded"
        );
        Ok(config)
    }
}
