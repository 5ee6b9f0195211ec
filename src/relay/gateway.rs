//! Indirect transport: hand the whole request to the gateway.
//!
//! The gateway runs the same direct routing from inside the hub's network
//! and answers with the JSON a direct call would have produced. One
//! [`GatewayClient::invoke`] is one attempt; the retry policy lives in the
//! dispatcher.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::config::model::GatewayConfig;
use crate::error::DispatchError;

use super::request::{NormalizedResponse, RoutedVia, RoutingRequest, RoutingResult};
use super::transport::{HttpTransport, OutboundRequest};

#[derive(Clone)]
pub struct GatewayClient {
    transport: Arc<dyn HttpTransport>,
    url: Option<String>,
    timeout: Duration,
}

impl GatewayClient {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, config: &GatewayConfig) -> Self {
        Self {
            transport,
            url: config.url.clone(),
            timeout: Duration::from_millis(config.timeout),
        }
    }

    fn endpoint(&self) -> Result<Url, DispatchError> {
        let raw = self.url.as_deref().ok_or_else(|| {
            DispatchError::Configuration(
                "Gateway URL is not configured (set gateway.url or GATEWAY_URL)".into(),
            )
        })?;
        Url::parse(raw)
            .map_err(|e| DispatchError::Configuration(format!("Invalid gateway URL '{raw}': {e}")))
    }

    /// Post the request envelope once. Non-2xx replies become
    /// [`DispatchError::Gateway`] carrying the gateway's status and body.
    pub async fn invoke(
        &self,
        request: &RoutingRequest,
        correlation_id: Option<&str>,
    ) -> Result<Value, DispatchError> {
        let url = self.endpoint()?;
        let body = serde_json::to_vec(request)
            .map(Bytes::from)
            .map_err(|e| DispatchError::Validation(format!("Unserializable request: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(id) = correlation_id.and_then(|id| HeaderValue::from_str(id).ok()) {
            headers.insert("x-correlation-id", id);
        }

        let raw = self
            .transport
            .send(OutboundRequest {
                method: Method::POST,
                url,
                headers,
                body,
                timeout: self.timeout,
            })
            .await?;

        // Gateways frequently label JSON as text; try JSON regardless.
        let text = String::from_utf8_lossy(&raw.body);
        let reply = serde_json::from_str::<Value>(&text)
            .unwrap_or_else(|_| Value::String(text.into_owned()));

        if raw.status.is_success() {
            return Ok(reply);
        }

        let message = match &reply {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Object(map) => map
                .get("error")
                .or_else(|| map.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| reason(raw.status.as_u16())),
            _ => reason(raw.status.as_u16()),
        };

        Err(DispatchError::Gateway {
            status: raw.status.as_u16(),
            message,
            response: reply,
        })
    }
}

fn reason(status: u16) -> String {
    axum::http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map_or_else(|| format!("Gateway returned {status}"), str::to_string)
}

/// Gateway success body; every field is optional on the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayReply {
    success: Option<bool>,
    status: Option<u16>,
    data: Option<Value>,
    responses: Option<Vec<NormalizedResponse>>,
    target_url: Option<String>,
    processed_at: Option<String>,
    error: Option<String>,
}

/// Map a 2xx gateway body onto a [`RoutingResult`].
#[must_use]
pub fn into_result(reply: Value, routed_via: RoutedVia) -> RoutingResult {
    match serde_json::from_value::<GatewayReply>(reply.clone()) {
        Ok(parsed) if reply.is_object() => RoutingResult {
            success: parsed.success.unwrap_or(true),
            status: parsed.status,
            data: parsed.data,
            responses: parsed.responses,
            target_url: parsed.target_url,
            processed_at: parsed.processed_at,
            routed_via,
            error: parsed.error,
        },
        _ => RoutingResult {
            success: true,
            status: None,
            data: Some(reply),
            responses: None,
            target_url: None,
            processed_at: None,
            routed_via,
            error: None,
        },
    }
}
