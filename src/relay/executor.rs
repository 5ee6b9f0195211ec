//! Single outbound POST to the hub API.
//!
//! [`Executor::execute`] builds the hub's required headers (Basic auth,
//! JSON content negotiation and the `X-Requested-With` marker), sends the
//! body through the injected [`HttpTransport`] and turns whatever comes
//! back into a [`NormalizedResponse`]. Status codes are never interpreted
//! here.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde_json::Value;
use url::Url;

use crate::error::DispatchError;

use super::request::{Credentials, NormalizedResponse};
use super::transport::{HttpTransport, OutboundRequest, RawResponse};

const USER_AGENT_VALUE: &str = concat!("hdh-relay/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn HttpTransport>,
}

impl Executor {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    pub async fn execute(
        &self,
        url: Url,
        credentials: &Credentials,
        body: &Value,
        timeout: Duration,
        correlation_id: Option<&str>,
    ) -> Result<NormalizedResponse, DispatchError> {
        let headers = hub_headers(credentials, correlation_id)?;
        let body = serde_json::to_vec(body)
            .map(Bytes::from)
            .map_err(|e| DispatchError::Validation(format!("Unserializable body: {e}")))?;

        let raw = self
            .transport
            .send(OutboundRequest {
                method: Method::POST,
                url,
                headers,
                body,
                timeout,
            })
            .await?;

        Ok(normalize(raw))
    }
}

/// `Basic base64(username:password)`.
#[must_use]
pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn hub_headers(
    credentials: &Credentials,
    correlation_id: Option<&str>,
) -> Result<HeaderMap, DispatchError> {
    let mut headers = HeaderMap::new();

    let mut auth = HeaderValue::from_str(&basic_auth(&credentials.username, &credentials.password))
        .map_err(|_| DispatchError::Validation("Credentials contain invalid characters".into()))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert("x-requested-with", HeaderValue::from_static("true"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

    if let Some(id) = correlation_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        headers.insert("x-correlation-id", id);
    }

    Ok(headers)
}

/// Body is `null` when empty, parsed JSON when the content type says so and
/// parsing succeeds, raw text otherwise.
#[must_use]
pub fn normalize(raw: RawResponse) -> NormalizedResponse {
    let declared_empty = raw
        .headers
        .get(CONTENT_LENGTH)
        .is_some_and(|v| v.as_bytes() == b"0");

    let data = if raw.status == StatusCode::NO_CONTENT || declared_empty || raw.body.is_empty() {
        Value::Null
    } else {
        let text = String::from_utf8_lossy(&raw.body);
        if is_json(&raw.headers) {
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned()))
        } else {
            Value::String(text.into_owned())
        }
    };

    NormalizedResponse {
        status: raw.status.as_u16(),
        data,
        headers: Some(flatten_headers(&raw.headers)),
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"))
}

fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}
