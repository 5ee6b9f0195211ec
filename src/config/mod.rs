//! Configuration loading, validation, and hot-reloading.
//!
//! Defines the [`ConfigSource`] trait for pluggable config backends, the
//! [`ConfigVersion`] enum for change detection, and [`Overrides`] for the
//! CLI/env values that win over whatever the source says. Submodules
//! provide the data model, validation logic, and concrete sources.

pub mod model;
pub mod sources;
pub mod validation;

use async_trait::async_trait;

use crate::error::RelayError;
use model::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigVersion {
    Hash(String),
    /// Built-in defaults, no backing source.
    Builtin,
}

// async_trait is required here because ConfigSource is used as Box<dyn ConfigSource>
// and native async fn in traits does not support dyn dispatch.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self) -> Result<(Config, ConfigVersion), RelayError>;
    async fn has_changed(&self, current: &ConfigVersion) -> Result<bool, RelayError>;
}

/// Source used when no config file is given or found.
pub struct BuiltinSource;

#[async_trait]
impl ConfigSource for BuiltinSource {
    fn name(&self) -> &'static str {
        "builtin"
    }

    async fn load(&self) -> Result<(Config, ConfigVersion), RelayError> {
        Ok((Config::default(), ConfigVersion::Builtin))
    }

    async fn has_changed(&self, _current: &ConfigVersion) -> Result<bool, RelayError> {
        Ok(false)
    }
}

/// Values from flags or environment that take precedence over the source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub gateway_url: Option<String>,
    pub direct_timeout: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref url) = self.gateway_url {
            config.gateway.url = Some(url.clone());
        }
        if let Some(timeout) = self.direct_timeout {
            config.direct.timeout = timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_source_values() {
        let mut config = Config::default();
        config.gateway.url = Some("https://from-file.example/gw".into());

        Overrides {
            gateway_url: Some("https://from-env.example/gw".into()),
            direct_timeout: Some(5000),
        }
        .apply(&mut config);

        assert_eq!(
            config.gateway.url.as_deref(),
            Some("https://from-env.example/gw")
        );
        assert_eq!(config.direct.timeout, 5000);
    }

    #[test]
    fn empty_overrides_keep_config() {
        let mut config = Config::default();
        Overrides::default().apply(&mut config);
        assert!(config.gateway.url.is_none());
        assert_eq!(config.direct.timeout, 20_000);
    }

    #[tokio::test]
    async fn builtin_source_never_changes() {
        let source = BuiltinSource;
        let (config, version) = source.load().await.unwrap();
        assert_eq!(version, ConfigVersion::Builtin);
        assert_eq!(config.gateway.max_retries, 1);
        assert!(!source.has_changed(&version).await.unwrap());
    }
}
