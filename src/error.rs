//! Unified error types for the relay.
//!
//! Defines [`RelayError`] (startup, config and CLI failures),
//! [`ValidationError`] for config validation failures, and
//! [`DispatchError`] for everything that can go wrong while routing a
//! single request. All use `thiserror` for `Display` and `Error` derives.

use std::path::PathBuf;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub section: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "  {}.{}: {}", self.section, self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid address: {0}")]
    AddressParse(#[from] std::net::AddrParseError),

    #[error("Invalid URI: {source}")]
    UriParse {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP request failed: {source}")]
    HttpRequest {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("File already exists: {}", path.display())]
    FileExists { path: PathBuf },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Health check failed with status {0}")]
    HealthCheckFailed(hyper::StatusCode),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Failure of one routed request.
///
/// Batch requests never surface per-item failures through this type; those
/// are folded into the batch's `responses` array instead.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid JSON content: {0}")]
    InvalidContent(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {} ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{message}")]
    Upstream {
        status: u16,
        message: String,
        response: Value,
    },

    #[error("{message}")]
    Gateway {
        status: u16,
        message: String,
        response: Value,
    },

    #[error("{0}")]
    Configuration(String),
}

impl DispatchError {
    /// HTTP status the caller should see for this failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidContent(_) => StatusCode::BAD_REQUEST,
            Self::Network(_) | Self::Timeout(_) | Self::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Upstream { status, .. } | Self::Gateway { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }

    /// Raw body returned by the upstream or gateway, when there was one.
    #[must_use]
    pub const fn response(&self) -> Option<&Value> {
        match self {
            Self::Upstream { response, .. } | Self::Gateway { response, .. } => Some(response),
            _ => None,
        }
    }

    /// Connection-level failures: the only ones eligible for the gateway fallback.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}
