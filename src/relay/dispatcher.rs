//! Dual-transport dispatch.
//!
//! [`Dispatcher::route`] validates and shapes the request, classifies the
//! target domain, and sends private domains through the gateway (with one
//! retry on a cold-start 500) and public domains straight to the hub.
//! Batch items run as spawned tasks and are collected by index, so the
//! response order always matches the payload order regardless of which
//! request finishes first. One failing item never fails the batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::Instrument;

use crate::config::model::Config;
use crate::error::DispatchError;

use super::classifier::DomainClassifier;
use super::executor::Executor;
use super::gateway::{self, GatewayClient};
use super::payload::{self, Endpoint, PayloadShaper};
use super::request::{
    BatchRequest, MessageRequest, NormalizedResponse, RoutedVia, RoutingRequest, RoutingResult,
};
use super::transport::HttpTransport;

#[derive(Clone)]
pub struct Dispatcher {
    executor: Executor,
    gateway: GatewayClient,
    classifier: DomainClassifier,
    shaper: PayloadShaper,
    api_path: String,
    direct_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    fallback_to_gateway: bool,
    correlation_id: Option<String>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self {
            executor: Executor::new(Arc::clone(&transport)),
            gateway: GatewayClient::new(transport, &config.gateway),
            classifier: DomainClassifier::new(&config.classifier),
            shaper: PayloadShaper::new(&config.messages),
            api_path: config.messages.api_path.clone(),
            direct_timeout: Duration::from_millis(config.direct.timeout),
            max_retries: config.gateway.max_retries,
            retry_delay: Duration::from_millis(config.gateway.retry_delay),
            fallback_to_gateway: config.direct.fallback_to_gateway,
            correlation_id: None,
        }
    }

    /// Forward `id` as `X-Correlation-Id` on every outbound call.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Route one request over the transport its domain calls for.
    pub async fn route(&self, request: RoutingRequest) -> Result<RoutingResult, DispatchError> {
        let body = self.prepare(&request)?;
        let domain = request.credentials().domain.as_str();

        if self.classifier.is_private(domain) {
            tracing::info!(mode = request.mode(), domain = %domain, route = "private", "routing via gateway");
            let reply = self.via_gateway(&request).await?;
            return Ok(gateway::into_result(reply, RoutedVia::Gateway));
        }

        tracing::info!(mode = request.mode(), domain = %domain, route = "public", "routing directly");
        match self.direct(&request, body).await {
            Ok(result) => Ok(result),
            Err(err) if self.fallback_to_gateway && err.is_transport() => {
                tracing::warn!(error = %err, "direct request failed, trying gateway fallback");
                match self
                    .gateway
                    .invoke(&request, self.correlation_id.as_deref())
                    .await
                {
                    Ok(reply) => Ok(gateway::into_result(reply, RoutedVia::GatewayFallback)),
                    Err(fallback_err) => {
                        tracing::error!(error = %fallback_err, "gateway fallback also failed");
                        Err(err)
                    }
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Route straight to the hub without classifying the domain. This is
    /// what a gateway runs, so it must never hop again.
    pub async fn route_direct(
        &self,
        request: RoutingRequest,
    ) -> Result<RoutingResult, DispatchError> {
        let body = self.prepare(&request)?;
        self.direct(&request, body).await
    }

    /// Validation and shaping; everything that can fail without I/O.
    fn prepare(&self, request: &RoutingRequest) -> Result<Option<Value>, DispatchError> {
        request.validate()?;
        match request {
            RoutingRequest::ProcessMessage(m) => self
                .shaper
                .shape_message_payload(
                    m.message_type,
                    &m.content,
                    m.data_source_identifier.as_deref(),
                )
                .map(Some),
            RoutingRequest::Proxy(_) => Ok(None),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn via_gateway(&self, request: &RoutingRequest) -> Result<Value, DispatchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .gateway
                .invoke(request, self.correlation_id.as_deref())
                .await
            {
                Ok(reply) => return Ok(reply),
                Err(DispatchError::Gateway { status: 500, .. }) if attempt <= self.max_retries => {
                    tracing::warn!(
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = self.retry_delay.as_millis() as u64,
                        "gateway returned 500, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => {
                    tracing::error!(attempt, error = %err, "gateway request failed");
                    return Err(err);
                }
            }
        }
    }

    async fn direct(
        &self,
        request: &RoutingRequest,
        body: Option<Value>,
    ) -> Result<RoutingResult, DispatchError> {
        match (request, body) {
            (RoutingRequest::ProcessMessage(m), Some(body)) => self.direct_message(m, body).await,
            (RoutingRequest::ProcessMessage(m), None) => {
                let body = self.shaper.shape_message_payload(
                    m.message_type,
                    &m.content,
                    m.data_source_identifier.as_deref(),
                )?;
                self.direct_message(m, body).await
            }
            (RoutingRequest::Proxy(b), _) => self.direct_batch(b).await,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn direct_message(
        &self,
        message: &MessageRequest,
        body: Value,
    ) -> Result<RoutingResult, DispatchError> {
        let url = payload::target_url(
            &message.credentials,
            &self.api_path,
            Endpoint::for_type(message.message_type),
        )?;

        tracing::debug!(target_url = %url, message_type = %message.message_type, "posting message");
        let start = Instant::now();
        let response = self
            .executor
            .execute(
                url,
                &message.credentials,
                &body,
                self.direct_timeout,
                self.correlation_id.as_deref(),
            )
            .await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        if response.status >= 400 {
            tracing::warn!(status = response.status, latency_ms, "hub rejected message");
            let error = response
                .data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Request failed")
                .to_string();
            return Ok(RoutingResult {
                success: false,
                error: Some(error),
                ..RoutingResult::message(response.status, response.data, RoutedVia::Direct)
            });
        }

        tracing::info!(status = response.status, latency_ms, "hub accepted message");
        Ok(RoutingResult::message(
            response.status,
            response.data,
            RoutedVia::Direct,
        ))
    }

    async fn direct_batch(&self, batch: &BatchRequest) -> Result<RoutingResult, DispatchError> {
        let url = payload::target_url(&batch.credentials, &self.api_path, Endpoint::Transactions)?;
        let total = batch.payloads.len();

        tracing::info!(target_url = %url, payloads = total, "fanning out batch");

        let handles: Vec<_> = batch
            .payloads
            .iter()
            .enumerate()
            .map(|(index, payload)| {
                let executor = self.executor.clone();
                let url = url.clone();
                let credentials = batch.credentials.clone();
                let body = self.shaper.shape_proxy_payload(payload.clone());
                let timeout = self.direct_timeout;
                let correlation_id = self.correlation_id.clone();

                tokio::spawn(
                    async move {
                        match executor
                            .execute(url, &credentials, &body, timeout, correlation_id.as_deref())
                            .await
                        {
                            Ok(response) => {
                                tracing::debug!(index, status = response.status, "batch item responded");
                                response
                            }
                            Err(err) => {
                                tracing::warn!(index, error = %err, "batch item failed");
                                NormalizedResponse::failed(&err)
                            }
                        }
                    }
                    .in_current_span(),
                )
            })
            .collect();

        // Await in spawn order: index i of the output is payload i.
        let mut responses = Vec::with_capacity(total);
        for (index, handle) in handles.into_iter().enumerate() {
            let response = match handle.await {
                Ok(response) => response,
                Err(join_err) => {
                    tracing::error!(index, error = %join_err, "batch item task panicked");
                    NormalizedResponse::failed(&DispatchError::Network(join_err.to_string()))
                }
            };
            responses.push(response);
        }

        let failed = responses.iter().filter(|r| r.status >= 400).count();
        tracing::info!(payloads = total, failed, "batch complete");

        Ok(RoutingResult::batch(
            responses,
            url.to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            RoutedVia::Direct,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::relay::request::{Credentials, MessageType};
    use crate::relay::transport::{OutboundRequest, RawResponse};

    const GATEWAY: &str = "https://gw.example.com/default/relay";

    type Responder =
        dyn Fn(&OutboundRequest, usize) -> Result<RawResponse, DispatchError> + Send + Sync;

    /// Scripted transport: answers via `respond(request, call_number)` and
    /// records every request. Batch items with an `"delay_ms"` field sleep first.
    struct Scripted {
        calls: Mutex<Vec<OutboundRequest>>,
        respond: Box<Responder>,
    }

    impl Scripted {
        fn new(
            respond: impl Fn(&OutboundRequest, usize) -> Result<RawResponse, DispatchError>
                + Send
                + Sync
                + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn calls_to(&self, host: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.url.host_str() == Some(host))
                .count()
        }
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        async fn send(&self, request: OutboundRequest) -> Result<RawResponse, DispatchError> {
            let delay = serde_json::from_slice::<Value>(&request.body)
                .ok()
                .and_then(|b| b.get("delay_ms").and_then(Value::as_u64))
                .unwrap_or(0);
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(request.clone());
                calls.len()
            };
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            (self.respond)(&request, call)
        }
    }

    fn json_response(status: u16, body: Value) -> RawResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: Bytes::from(serde_json::to_vec(&body).unwrap()),
        }
    }

    fn config(gateway: Option<&str>) -> Config {
        let mut config = Config::default();
        config.gateway.url = gateway.map(str::to_string);
        config
    }

    fn credentials(domain: &str) -> Credentials {
        Credentials {
            domain: domain.into(),
            username: "u".into(),
            password: "p".into(),
        }
    }

    fn message(domain: &str, message_type: MessageType, content: &str) -> RoutingRequest {
        RoutingRequest::ProcessMessage(MessageRequest {
            message_type,
            content: content.into(),
            credentials: credentials(domain),
            data_source_identifier: None,
        })
    }

    fn batch(domain: &str, payloads: Vec<Value>) -> RoutingRequest {
        RoutingRequest::Proxy(BatchRequest {
            credentials: credentials(domain),
            payloads,
        })
    }

    #[tokio::test]
    async fn private_message_is_forwarded_to_gateway_verbatim() {
        let transport = Scripted::new(|_, _| {
            Ok(json_response(200, json!({"success": true, "status": 201, "data": {"id": "tx-1"}})))
        });
        let dispatcher = Dispatcher::new(transport.clone(), &config(Some(GATEWAY)));

        let result = dispatcher
            .route(message(
                "https://test.rnd.hdh.nextgenaws.net/",
                MessageType::Json,
                r#"{"a":1}"#,
            ))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.routed_via, RoutedVia::Gateway);
        assert_eq!(result.status, Some(201));
        assert_eq!(result.data, Some(json!({"id": "tx-1"})));

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url.as_str(), GATEWAY);
        assert_eq!(
            serde_json::from_slice::<Value>(&calls[0].body).unwrap(),
            json!({
                "mode": "processMessage",
                "type": "json",
                "content": "{\"a\":1}",
                "domain": "https://test.rnd.hdh.nextgenaws.net/",
                "username": "u",
                "password": "p",
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_cold_start_500_is_retried_once() {
        let transport = Scripted::new(|_, call| {
            if call == 1 {
                Ok(json_response(500, json!({"message": "Internal server error"})))
            } else {
                Ok(json_response(200, json!({"success": true, "status": 200, "data": null})))
            }
        });
        let dispatcher = Dispatcher::new(transport.clone(), &config(Some(GATEWAY)));

        let started = tokio::time::Instant::now();
        let result = dispatcher
            .route(message("http://10.1.2.3", MessageType::Hl7, "MSH|^~\\&|"))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(transport.calls_to("gw.example.com"), 2);
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn second_gateway_500_propagates() {
        let transport =
            Scripted::new(|_, _| Ok(json_response(500, json!({"error": "still cold"}))));
        let dispatcher = Dispatcher::new(transport.clone(), &config(Some(GATEWAY)));

        let err = dispatcher
            .route(batch("https://qa1.rnd.hdh.nextgenaws.net", vec![json!({"id": 1})]))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Gateway { status: 500, .. }));
        assert_eq!(err.to_string(), "still cold");
        assert_eq!(transport.calls_to("gw.example.com"), 2);
    }

    #[tokio::test]
    async fn other_gateway_failures_are_not_retried() {
        let transport = Scripted::new(|_, _| Ok(json_response(502, json!("bad gateway"))));
        let dispatcher = Dispatcher::new(transport.clone(), &config(Some(GATEWAY)));
        let err = dispatcher
            .route(message("localhost:8080", MessageType::Cda, "<x/>"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Gateway { status: 502, .. }));
        assert_eq!(transport.calls_to("gw.example.com"), 1);

        let transport = Scripted::new(|_, _| Err(DispatchError::Network("connection reset".into())));
        let dispatcher = Dispatcher::new(transport.clone(), &config(Some(GATEWAY)));
        let err = dispatcher
            .route(message("localhost:8080", MessageType::Cda, "<x/>"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Network(_)));
        assert_eq!(transport.calls_to("gw.example.com"), 1);
    }

    #[tokio::test]
    async fn private_domain_without_gateway_is_a_configuration_error() {
        let transport = Scripted::new(|_, _| Ok(json_response(200, json!({}))));
        let dispatcher = Dispatcher::new(transport.clone(), &config(None));
        let err = dispatcher
            .route(message("http://192.168.0.10", MessageType::Hl7, "MSH|"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn public_batch_posts_each_payload_with_basic_auth() {
        let transport = Scripted::new(|req, _| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            Ok(json_response(201, json!({"received": body["id"]})))
        });
        let dispatcher = Dispatcher::new(transport.clone(), &config(Some(GATEWAY)));

        let result = dispatcher
            .route(batch(
                "https://public.example.com/",
                vec![json!({"id": 1}), json!({"id": 2})],
            ))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.routed_via, RoutedVia::Direct);
        assert_eq!(
            result.target_url.as_deref(),
            Some("https://public.example.com/health-data-hub/api/v1/transactions")
        );
        assert!(result.processed_at.unwrap().ends_with('Z'));
        let responses = result.responses.unwrap();
        assert_eq!(responses[0].data, json!({"received": 1}));
        assert_eq!(responses[1].data, json!({"received": 2}));

        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        for call in calls.iter() {
            assert_eq!(
                call.url.as_str(),
                "https://public.example.com/health-data-hub/api/v1/transactions"
            );
            assert_eq!(call.headers[AUTHORIZATION], "Basic dTpw");
        }
        drop(calls);
        assert_eq!(transport.calls_to("gw.example.com"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_isolates_failures_and_keeps_input_order() {
        let transport = Scripted::new(|req, _| {
            let body: Value = serde_json::from_slice(&req.body).unwrap();
            if body["id"] == 2 {
                Err(DispatchError::Network("connection refused".into()))
            } else {
                Ok(json_response(200 + body["id"].as_u64().unwrap() as u16, body))
            }
        });
        let dispatcher = Dispatcher::new(transport.clone(), &config(None));

        let payloads = vec![
            json!({"id": 1, "delay_ms": 300}),
            json!({"id": 2}),
            json!({"id": 3, "delay_ms": 10}),
        ];
        let result = dispatcher
            .route(batch("https://public.example.com", payloads))
            .await
            .unwrap();

        assert!(result.success);
        let responses = result.responses.unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].status, 201);
        assert_eq!(
            responses[1],
            NormalizedResponse {
                status: 500,
                data: json!({"error": "Request failed: Network error: connection refused"}),
                headers: None,
            }
        );
        assert_eq!(responses[2].status, 203);
    }

    #[tokio::test]
    async fn public_failure_never_touches_gateway() {
        let transport = Scripted::new(|_, _| Err(DispatchError::Network("dns failure".into())));
        let dispatcher = Dispatcher::new(transport.clone(), &config(Some(GATEWAY)));

        let err = dispatcher
            .route(message("https://public.example.com", MessageType::Json, "{}"))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::Network(_)));
        assert_eq!(transport.calls_to("public.example.com"), 1);
        assert_eq!(transport.calls_to("gw.example.com"), 0);
    }

    #[tokio::test]
    async fn upstream_rejection_is_a_failed_result_not_an_error() {
        let transport = Scripted::new(|_, _| {
            Ok(json_response(422, json!({"message": "Unknown data source"})))
        });
        let dispatcher = Dispatcher::new(transport.clone(), &config(None));

        let result = dispatcher
            .route(message("https://public.example.com", MessageType::Hl7, "MSH|"))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.status, Some(422));
        assert_eq!(result.error.as_deref(), Some("Unknown data source"));
        assert_eq!(result.data, Some(json!({"message": "Unknown data source"})));

        let calls = transport.calls.lock().unwrap();
        assert_eq!(
            calls[0].url.as_str(),
            "https://public.example.com/health-data-hub/api/v1/messages"
        );
        let sent: Value = serde_json::from_slice(&calls[0].body).unwrap();
        assert_eq!(sent["dataSourceIdentifier"], "LAB2");
        assert_eq!(sent["message"]["type"], "HL7");
    }

    #[tokio::test]
    async fn upstream_rejection_without_message_uses_generic_error() {
        let transport = Scripted::new(|_, _| Ok(json_response(503, json!(null))));
        let dispatcher = Dispatcher::new(transport, &config(None));
        let result = dispatcher
            .route(message("https://public.example.com", MessageType::Json, "{}"))
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("Request failed"));
    }

    #[tokio::test]
    async fn invalid_json_fails_before_any_request() {
        let transport = Scripted::new(|_, _| Ok(json_response(200, json!({}))));
        let dispatcher = Dispatcher::new(transport.clone(), &config(Some(GATEWAY)));

        for domain in ["https://public.example.com", "https://qa1.rnd.hdh.nextgenaws.net"] {
            let err = dispatcher
                .route(message(domain, MessageType::Json, "{broken"))
                .await
                .unwrap_err();
            assert!(matches!(err, DispatchError::InvalidContent(_)));
        }
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fallback_reroutes_transport_failures_when_enabled() {
        let transport = Scripted::new(|req, _| {
            if req.url.host_str() == Some("gw.example.com") {
                Ok(json_response(200, json!({"success": true, "status": 200, "data": "ok"})))
            } else {
                Err(DispatchError::Timeout(Duration::from_secs(20)))
            }
        });
        let mut cfg = config(Some(GATEWAY));
        cfg.direct.fallback_to_gateway = true;
        let dispatcher = Dispatcher::new(transport.clone(), &cfg);

        let result = dispatcher
            .route(message("https://public.example.com", MessageType::Json, "{}"))
            .await
            .unwrap();

        assert_eq!(result.routed_via, RoutedVia::GatewayFallback);
        assert_eq!(transport.calls_to("gw.example.com"), 1);
    }

    #[tokio::test]
    async fn failed_fallback_reports_the_direct_error() {
        let transport = Scripted::new(|req, _| {
            if req.url.host_str() == Some("gw.example.com") {
                Ok(json_response(403, json!({"error": "forbidden"})))
            } else {
                Err(DispatchError::Network("connection refused".into()))
            }
        });
        let mut cfg = config(Some(GATEWAY));
        cfg.direct.fallback_to_gateway = true;
        let dispatcher = Dispatcher::new(transport, &cfg);

        let err = dispatcher
            .route(message("https://public.example.com", MessageType::Json, "{}"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Network error: connection refused");
    }

    #[tokio::test]
    async fn route_direct_ignores_classification() {
        let transport = Scripted::new(|_, _| Ok(json_response(201, json!({"id": 5}))));
        let dispatcher = Dispatcher::new(transport.clone(), &config(Some(GATEWAY)))
            .with_correlation_id("cid-42");

        let result = dispatcher
            .route_direct(message(
                "https://qa1.rnd.hdh.nextgenaws.net",
                MessageType::Json,
                r#"{"resourceType":"Bundle"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(result.routed_via, RoutedVia::Direct);
        assert_eq!(transport.calls_to("gw.example.com"), 0);
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].headers["x-correlation-id"], "cid-42");
        assert_eq!(
            serde_json::from_slice::<Value>(&calls[0].body).unwrap(),
            json!({"resourceType": "Bundle"})
        );
    }

    #[tokio::test]
    async fn missing_credentials_fail_fast() {
        let transport = Scripted::new(|_, _| Ok(json_response(200, json!({}))));
        let dispatcher = Dispatcher::new(transport.clone(), &config(Some(GATEWAY)));
        let mut request = batch("https://public.example.com", vec![json!({})]);
        if let RoutingRequest::Proxy(ref mut b) = request {
            b.credentials.password.clear();
        }
        let err = dispatcher.route(request).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required fields: password");
        assert!(transport.calls.lock().unwrap().is_empty());
    }
}
