//! Outbound HTTP seam.
//!
//! [`HttpTransport`] is the single point where bytes leave the process.
//! The production implementation, [`PooledTransport`], wraps the
//! keep-alive hyper client and caps concurrent connections per target;
//! tests swap in a scripted fake.

use std::collections::HashMap;
use std::error::Error as _;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use tokio::sync::Semaphore;
use url::Url;

use crate::error::DispatchError;
use crate::server::HttpClient;

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

// async_trait keeps the trait object-safe for Arc<dyn HttpTransport>.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform one request. Failures are `Network` or `Timeout`; any HTTP
    /// status, including 4xx/5xx, is a successful exchange.
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, DispatchError>;
}

pub struct PooledTransport {
    client: HttpClient,
    max_connections: usize,
    limits: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl PooledTransport {
    #[must_use]
    pub fn new(client: HttpClient, max_connections: usize) -> Self {
        Self {
            client,
            max_connections: max_connections.max(1),
            limits: Mutex::new(HashMap::new()),
        }
    }

    /// Semaphore for the target of `url`, created on first use.
    ///
    /// Every clone is handed out under the map lock, so an entry whose only
    /// reference is the map has no waiters and no permits out. Those entries
    /// are swept whenever a new target is added, which keeps the map at the
    /// number of targets with requests in flight.
    fn limiter(&self, url: &Url) -> Arc<Semaphore> {
        let key = target_key(url);
        let mut limits = self.limits.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = limits.get(&key) {
            return Arc::clone(existing);
        }

        limits.retain(|_, semaphore| Arc::strong_count(semaphore) > 1);
        let semaphore = Arc::new(Semaphore::new(self.max_connections));
        limits.insert(key, Arc::clone(&semaphore));
        semaphore
    }

    #[cfg(test)]
    fn tracked_targets(&self) -> usize {
        self.limits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl HttpTransport for PooledTransport {
    async fn send(&self, request: OutboundRequest) -> Result<RawResponse, DispatchError> {
        let mut builder = hyper::Request::builder()
            .method(request.method)
            .uri(request.url.as_str());
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        let outbound = builder
            .body(Full::new(request.body))
            .map_err(|e| DispatchError::Validation(format!("Invalid request: {e}")))?;

        let limiter = self.limiter(&request.url);
        let exchange = async {
            let _permit = limiter
                .acquire_owned()
                .await
                .map_err(|e| DispatchError::Network(e.to_string()))?;

            let response = self
                .client
                .request(outbound)
                .await
                .map_err(|e| DispatchError::Network(describe(&e)))?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| DispatchError::Network(format!("body read error: {e}")))?
                .to_bytes();

            Ok(RawResponse {
                status,
                headers,
                body,
            })
        };

        tokio::time::timeout(request.timeout, exchange)
            .await
            .map_err(|_| DispatchError::Timeout(request.timeout))?
    }
}

/// Connection-limit bucket: scheme, host and effective port.
fn target_key(url: &Url) -> String {
    format!(
        "{}://{}:{}",
        url.scheme(),
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}

/// hyper-util wraps the interesting cause (DNS, refused, reset) a few
/// levels down; flatten the chain into one line.
fn describe(err: &hyper_util::client::legacy::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
