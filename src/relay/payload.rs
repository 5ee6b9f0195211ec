//! Request bodies and endpoints expected by the hub API.
//!
//! JSON transactions are posted verbatim to `/transactions`; HL7 and CDA
//! documents are wrapped in a message envelope and posted to `/messages`.
//! Batch payloads are already complete transaction envelopes and pass
//! through untouched.

use serde_json::{json, Value};
use url::Url;

use crate::config::model::{LineEndings, MessageConfig};
use crate::error::DispatchError;

use super::request::{Credentials, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Transactions,
    Messages,
}

impl Endpoint {
    #[must_use]
    pub const fn for_type(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Json => Self::Transactions,
            MessageType::Hl7 | MessageType::Cda => Self::Messages,
        }
    }

    const fn segment(self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::Messages => "messages",
        }
    }
}

/// `<domain>/<api_path>/<endpoint>`, e.g.
/// `https://hub.example.com/health-data-hub/api/v1/transactions`.
pub fn target_url(
    credentials: &Credentials,
    api_path: &str,
    endpoint: Endpoint,
) -> Result<Url, DispatchError> {
    let base = credentials.base_url()?;
    let relative = format!("{}/{}", api_path.trim_matches('/'), endpoint.segment());
    base.join(&relative).map_err(|e| {
        DispatchError::Validation(format!("Invalid target URL for '{}': {e}", credentials.domain))
    })
}

#[derive(Debug, Clone)]
pub struct PayloadShaper {
    default_data_source: String,
    hl7_line_endings: LineEndings,
}

impl PayloadShaper {
    #[must_use]
    pub fn new(config: &MessageConfig) -> Self {
        Self {
            default_data_source: config.default_data_source.clone(),
            hl7_line_endings: config.hl7_line_endings,
        }
    }

    /// Body for a single message of the given type.
    pub fn shape_message_payload(
        &self,
        message_type: MessageType,
        content: &str,
        data_source_identifier: Option<&str>,
    ) -> Result<Value, DispatchError> {
        if message_type == MessageType::Json {
            return serde_json::from_str(content)
                .map_err(|e| DispatchError::InvalidContent(e.to_string()));
        }

        let data = if message_type == MessageType::Hl7 {
            rewrite_line_endings(content, self.hl7_line_endings)
        } else {
            content.to_string()
        };

        let data_source = data_source_identifier
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_data_source);

        Ok(json!({
            "dataSourceIdentifier": data_source,
            "originalMessage": {
                "data": data,
                "type": message_type.label(),
            },
            "message": {
                "data": data,
                "type": message_type.label(),
            },
        }))
    }

    /// Body for one batch item.
    #[must_use]
    pub fn shape_proxy_payload(&self, payload: Value) -> Value {
        payload
    }
}

impl Default for PayloadShaper {
    fn default() -> Self {
        Self::new(&MessageConfig::default())
    }
}

fn rewrite_line_endings(content: &str, policy: LineEndings) -> String {
    match policy {
        LineEndings::Preserve => content.to_string(),
        LineEndings::Crlf => {
            let mut out = String::with_capacity(content.len() + content.len() / 32);
            let mut prev = '\0';
            for ch in content.chars() {
                if ch == '\n' && prev != '\r' {
                    out.push('\r');
                }
                out.push(ch);
                prev = ch;
            }
            out
        }
        LineEndings::Cr => content.replace("\r\n", "\r").replace('\n', "\r"),
    }
}
