//! File-backed config source with SHA-256 change detection.
//!
//! [`FileSource`] reads the relay config from disk with Tokio, hands the
//! text to a format-specific deserializer chosen at construction time,
//! validates the result and hashes the raw bytes so the refresh loop can
//! tell when the file was edited.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::sha256_hex;
use crate::config::model::Config;
use crate::config::validation::validate;
use crate::config::{ConfigSource, ConfigVersion};
use crate::error::RelayError;

type Deserializer = fn(&str) -> Result<Config, Box<dyn std::error::Error + Send + Sync>>;

pub struct FileSource {
    path: PathBuf,
    format: &'static str,
    deserialize: Deserializer,
}

impl FileSource {
    #[must_use]
    pub fn new(path: PathBuf, format: &'static str, deserialize: Deserializer) -> Self {
        Self {
            path,
            format,
            deserialize,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<String, RelayError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RelayError::ConfigFileNotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => Err(RelayError::Io(e)),
        }
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    fn name(&self) -> &'static str {
        self.format
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), RelayError> {
        let content = self.read().await?;

        let config = (self.deserialize)(&content).map_err(|source| RelayError::ConfigParse {
            path: self.path.display().to_string(),
            source,
        })?;

        validate(&config).map_err(|errors| RelayError::ConfigValidation { errors })?;

        Ok((config, ConfigVersion::Hash(sha256_hex(content.as_bytes()))))
    }

    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, RelayError> {
        let content = self.read().await?;
        let latest = ConfigVersion::Hash(sha256_hex(content.as_bytes()));
        Ok(*current != latest)
    }
}
