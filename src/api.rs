//! HTTP handlers for the relay endpoints.
//!
//! `POST /api/process-message` and `POST /api/proxy` take the form bodies
//! and go through [`Dispatcher::route`](crate::relay::dispatcher::Dispatcher::route).
//! `POST /gateway` takes the gateway envelope, always routes directly and
//! answers in the shape a gateway client expects.
//!
//! Every response carries `x-correlation-id`, echoed from the request or
//! generated here, and the same id is attached to the handler's span.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::Instrument;

use crate::error::DispatchError;
use crate::relay::request::{BatchForm, MessageForm, RoutingRequest, RoutingResult};
use crate::server::AppState;

const CORRELATION_HEADER: &str = "x-correlation-id";

pub async fn process_message(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = correlation_id(&headers);
    let span = tracing::info_span!("process_message", correlation_id = %correlation_id);

    async {
        tracing::info!(client_ip = %addr.ip(), "message received");
        let outcome = match parse::<MessageForm>(&body).and_then(MessageForm::into_request) {
            Ok(request) => state.dispatcher(&correlation_id).await.route(request).await,
            Err(e) => Err(e),
        };
        relay_response(&state, outcome, &correlation_id)
    }
    .instrument(span)
    .await
}

pub async fn proxy(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = correlation_id(&headers);
    let span = tracing::info_span!("proxy", correlation_id = %correlation_id);

    async {
        tracing::info!(client_ip = %addr.ip(), "batch received");
        let outcome = match parse::<BatchForm>(&body).and_then(BatchForm::into_request) {
            Ok(request) => state.dispatcher(&correlation_id).await.route(request).await,
            Err(e) => Err(e),
        };
        relay_response(&state, outcome, &correlation_id)
    }
    .instrument(span)
    .await
}

/// The gateway side of the indirect transport. Never re-classifies: a
/// gateway that forwarded to another gateway could loop.
pub async fn gateway(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let correlation_id = correlation_id(&headers);
    let span = tracing::info_span!("gateway", correlation_id = %correlation_id);

    async {
        let outcome = match parse::<RoutingRequest>(&body) {
            Ok(request) => {
                tracing::info!(client_ip = %addr.ip(), mode = request.mode(), "gateway request received");
                state
                    .dispatcher(&correlation_id)
                    .await
                    .route_direct(request)
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                record(&state, result.success);
                let status = result_status(&result);
                respond(status, gateway_body(result), &correlation_id)
            }
            Err(e) => {
                record(&state, false);
                tracing::warn!(error = %e, status = e.status().as_u16(), "gateway request failed");
                respond(e.status(), error_body(&e), &correlation_id)
            }
        }
    }
    .instrument(span)
    .await
}

fn parse<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, DispatchError> {
    serde_json::from_slice(body)
        .map_err(|e| DispatchError::Validation(format!("Invalid request body: {e}")))
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from)
}

fn relay_response(
    state: &AppState,
    outcome: Result<RoutingResult, DispatchError>,
    correlation_id: &str,
) -> Response {
    match outcome {
        Ok(result) => {
            record(state, result.success);
            let status = result_status(&result);
            tracing::info!(
                status = status.as_u16(),
                routed_via = result.routed_via.as_str(),
                success = result.success,
                "request completed"
            );
            let body = serde_json::to_value(&result).unwrap_or_else(|e| {
                json!({"success": false, "error": format!("Unserializable result: {e}")})
            });
            respond(status, body, correlation_id)
        }
        Err(e) => {
            record(state, false);
            if e.status().is_server_error() {
                tracing::error!(error = %e, status = e.status().as_u16(), "request failed");
            } else {
                tracing::warn!(error = %e, status = e.status().as_u16(), "request rejected");
            }
            respond(e.status(), error_body(&e), correlation_id)
        }
    }
}

fn record(state: &AppState, success: bool) {
    let counter = if success {
        &state.stats.forwarded
    } else {
        &state.stats.failed
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

/// 200 on success; an upstream rejection keeps the upstream status.
fn result_status(result: &RoutingResult) -> StatusCode {
    if result.success {
        return StatusCode::OK;
    }
    result
        .status
        .and_then(|s| StatusCode::from_u16(s).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn gateway_body(result: RoutingResult) -> Value {
    if let Some(responses) = result.responses {
        return json!({
            "success": result.success,
            "responses": responses,
            "targetUrl": result.target_url,
            "processedAt": result.processed_at,
        });
    }
    if result.success {
        json!({
            "success": true,
            "status": result.status,
            "data": result.data,
        })
    } else {
        json!({
            "success": false,
            "error": result.error,
            "status": result.status,
            "data": result.data,
            "timestamp": timestamp(),
        })
    }
}

/// `{success: false, error, status, response?, timestamp}`.
#[must_use]
pub fn error_body(err: &DispatchError) -> Value {
    let mut body = json!({
        "success": false,
        "error": err.to_string(),
        "status": err.status().as_u16(),
        "timestamp": timestamp(),
    });
    if let Some(response) = err.response() {
        body["response"] = response.clone();
    }
    body
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn respond(status: StatusCode, body: Value, correlation_id: &str) -> Response {
    let mut response = (status, Json(body)).into_response();
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
