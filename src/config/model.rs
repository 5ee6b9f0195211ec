//! Serde data structures for the relay configuration file.
//!
//! Contains [`Config`] (the root), [`GatewayConfig`], [`DirectConfig`],
//! [`ClassifierConfig`] and [`MessageConfig`]. Every field has a default so
//! an empty file (or no file at all) yields a working configuration. All
//! types use `deny_unknown_fields` for strict parsing.

use serde::{Deserialize, Serialize};

const fn default_gateway_timeout() -> u64 {
    30_000
}

const fn default_max_retries() -> u32 {
    1
}

const fn default_retry_delay() -> u64 {
    1000
}

const fn default_direct_timeout() -> u64 {
    20_000
}

const fn default_max_connections() -> usize {
    50
}

fn default_private_suffixes() -> Vec<String> {
    vec![".rnd.hdh.nextgenaws.net".to_string()]
}

fn default_private_infixes() -> Vec<String> {
    vec![".internal.".to_string(), ".private.".to_string()]
}

fn default_api_path() -> String {
    "health-data-hub/api/v1".to_string()
}

fn default_data_source() -> String {
    "LAB2".to_string()
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub direct: DirectConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub messages: MessageConfig,
}

/// Indirect transport used for private domains.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_gateway_timeout")]
    pub timeout: u64,

    /// Extra attempts after the gateway answers 500.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause before each retry, in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: default_gateway_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DirectConfig {
    #[serde(default = "default_direct_timeout")]
    pub timeout: u64,

    /// Concurrent connections allowed per target (scheme, host, port).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Retry a public domain through the gateway when the direct call
    /// cannot connect or times out.
    #[serde(default, skip_serializing_if = "is_false")]
    pub fallback_to_gateway: bool,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            timeout: default_direct_timeout(),
            max_connections: default_max_connections(),
            fallback_to_gateway: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    #[serde(default = "default_private_suffixes")]
    pub private_suffixes: Vec<String>,

    #[serde(default = "default_private_infixes")]
    pub private_infixes: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            private_suffixes: default_private_suffixes(),
            private_infixes: default_private_infixes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessageConfig {
    /// Path of the hub API below the domain, without leading or trailing slash.
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// `dataSourceIdentifier` used when the caller supplies none.
    #[serde(default = "default_data_source")]
    pub default_data_source: String,

    #[serde(default)]
    pub hl7_line_endings: LineEndings,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            api_path: default_api_path(),
            default_data_source: default_data_source(),
            hl7_line_endings: LineEndings::default(),
        }
    }
}

/// Line-break rewriting applied to HL7 content before it is enveloped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEndings {
    /// Forward the content byte for byte.
    #[default]
    Preserve,
    /// Bare `\n` becomes `\r\n`.
    Crlf,
    /// Every line break becomes a bare `\r` (the HL7 segment terminator).
    Cr,
}
