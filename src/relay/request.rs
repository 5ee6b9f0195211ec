//! Request and result types flowing through the dispatcher.
//!
//! [`RoutingRequest`] is the tagged union the dispatcher consumes and also
//! the gateway wire format (`{"mode": "processMessage" | "proxy", ...}`).
//! [`MessageForm`] and [`BatchForm`] are the loose shapes the HTTP
//! endpoints accept; converting them reports every missing field at once.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use url::Url;

use crate::error::DispatchError;

/// Target domain plus the Basic-auth pair for the hub API.
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    pub domain: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"******")
            .finish()
    }
}

impl Credentials {
    /// Domain as a base URL ending in `/`. A missing scheme means `https`.
    pub fn base_url(&self) -> Result<Url, DispatchError> {
        let domain = self.domain.trim();
        let with_scheme = if domain.contains("://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };

        let mut url = Url::parse(&with_scheme)
            .map_err(|e| DispatchError::Validation(format!("Invalid domain '{domain}': {e}")))?;

        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(DispatchError::Validation(format!(
                "Invalid domain '{domain}': expected an http or https host"
            )));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(url)
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.domain.trim().is_empty() {
            missing.push("domain");
        }
        if self.username.is_empty() {
            missing.push("username");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        missing
    }
}

/// Payload kinds the hub accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// A full transaction document, posted to `/transactions` as-is.
    Json,
    Hl7,
    Cda,
}

impl MessageType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Hl7 => "hl7",
            Self::Cda => "cda",
        }
    }

    /// Upper-case label used inside the message envelope.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Json => "JSON",
            Self::Hl7 => "HL7",
            Self::Cda => "CDA",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "hl7" => Ok(Self::Hl7),
            "cda" => Ok(Self::Cda),
            other => Err(DispatchError::Validation(format!(
                "Unsupported message type '{other}' (expected json, hl7 or cda)"
            ))),
        }
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageRequest {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    #[serde(flatten)]
    pub credentials: Credentials,
    #[serde(
        rename = "dataSourceIdentifier",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub data_source_identifier: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchRequest {
    #[serde(flatten)]
    pub credentials: Credentials,
    pub payloads: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "mode")]
pub enum RoutingRequest {
    #[serde(rename = "processMessage")]
    ProcessMessage(MessageRequest),
    #[serde(rename = "proxy")]
    Proxy(BatchRequest),
}

impl RoutingRequest {
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        match self {
            Self::ProcessMessage(m) => &m.credentials,
            Self::Proxy(b) => &b.credentials,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> &'static str {
        match self {
            Self::ProcessMessage(_) => "processMessage",
            Self::Proxy(_) => "proxy",
        }
    }

    /// Structural checks that must pass before any network I/O.
    pub fn validate(&self) -> Result<(), DispatchError> {
        let mut missing = self.credentials().missing_fields();
        match self {
            Self::ProcessMessage(m) if m.content.is_empty() => missing.push("content"),
            Self::Proxy(b) if b.payloads.is_empty() => {
                if missing.is_empty() {
                    return Err(DispatchError::Validation(
                        "payloads must contain at least one transaction".into(),
                    ));
                }
            }
            _ => {}
        }
        if !missing.is_empty() {
            return Err(missing_fields_error(&missing));
        }
        self.credentials().base_url().map(|_| ())
    }
}

fn missing_fields_error(fields: &[&str]) -> DispatchError {
    DispatchError::Validation(format!("Missing required fields: {}", fields.join(", ")))
}

fn is_blank(value: Option<&String>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Body of `POST /api/process-message`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageForm {
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub content: Option<Value>,
    pub domain: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub data_source_identifier: Option<String>,
}

impl MessageForm {
    pub fn into_request(self) -> Result<RoutingRequest, DispatchError> {
        let content_missing = match &self.content {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        };

        let mut missing = Vec::new();
        if is_blank(self.message_type.as_ref()) {
            missing.push("type");
        }
        if content_missing {
            missing.push("content");
        }
        if is_blank(self.domain.as_ref()) {
            missing.push("domain");
        }
        if self.username.as_deref().map_or(true, str::is_empty) {
            missing.push("username");
        }
        if self.password.as_deref().map_or(true, str::is_empty) {
            missing.push("password");
        }
        if !missing.is_empty() {
            return Err(missing_fields_error(&missing));
        }

        let Some(Value::String(content)) = self.content else {
            return Err(DispatchError::Validation("Content must be a string".into()));
        };

        let message_type = self.message_type.unwrap_or_default().parse()?;

        Ok(RoutingRequest::ProcessMessage(MessageRequest {
            message_type,
            content,
            credentials: Credentials {
                domain: self.domain.unwrap_or_default(),
                username: self.username.unwrap_or_default(),
                password: self.password.unwrap_or_default(),
            },
            data_source_identifier: self.data_source_identifier.filter(|s| !s.is_empty()),
        }))
    }
}

/// Body of `POST /api/proxy`.
#[derive(Debug, Default, Deserialize)]
pub struct BatchForm {
    pub domain: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub payloads: Option<Vec<Value>>,
}

impl BatchForm {
    pub fn into_request(self) -> Result<RoutingRequest, DispatchError> {
        let mut missing = Vec::new();
        if is_blank(self.domain.as_ref()) {
            missing.push("domain");
        }
        if self.username.as_deref().map_or(true, str::is_empty) {
            missing.push("username");
        }
        if self.password.as_deref().map_or(true, str::is_empty) {
            missing.push("password");
        }
        if self.payloads.is_none() {
            missing.push("payloads");
        }
        if !missing.is_empty() {
            return Err(missing_fields_error(&missing));
        }

        Ok(RoutingRequest::Proxy(BatchRequest {
            credentials: Credentials {
                domain: self.domain.unwrap_or_default(),
                username: self.username.unwrap_or_default(),
                password: self.password.unwrap_or_default(),
            },
            payloads: self.payloads.unwrap_or_default(),
        }))
    }
}

/// Outcome of one outbound call, identical for both transports.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NormalizedResponse {
    pub status: u16,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl NormalizedResponse {
    /// Synthetic entry for a batch item whose request never completed.
    #[must_use]
    pub fn failed(error: &DispatchError) -> Self {
        Self {
            status: 500,
            data: serde_json::json!({ "error": format!("Request failed: {error}") }),
            headers: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutedVia {
    #[serde(rename = "direct")]
    Direct,
    #[serde(rename = "lambda")]
    Gateway,
    #[serde(rename = "lambda-fallback")]
    GatewayFallback,
}

impl RoutedVia {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Gateway => "lambda",
            Self::GatewayFallback => "lambda-fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responses: Option<Vec<NormalizedResponse>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    pub routed_via: RoutedVia,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RoutingResult {
    #[must_use]
    pub fn message(status: u16, data: Value, routed_via: RoutedVia) -> Self {
        Self {
            success: true,
            status: Some(status),
            data: Some(data),
            responses: None,
            target_url: None,
            processed_at: None,
            routed_via,
            error: None,
        }
    }

    #[must_use]
    pub fn batch(
        responses: Vec<NormalizedResponse>,
        target_url: String,
        processed_at: String,
        routed_via: RoutedVia,
    ) -> Self {
        Self {
            success: true,
            status: None,
            data: None,
            responses: Some(responses),
            target_url: Some(target_url),
            processed_at: Some(processed_at),
            routed_via,
            error: None,
        }
    }
}
