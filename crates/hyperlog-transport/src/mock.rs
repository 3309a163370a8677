//! Scripted transport for tests and offline replays.
//!
//! Routes are keyed by url path (base stripped), so the same script answers
//! whether a replay targets the original host or a rebased one.
//!
//! ```ignore
//! use hyperlog_transport::{MockTransport, Transport, TransportRequest};
//!
//! # tokio_test_block_on(async {
//! let transport = MockTransport::new("test");
//! transport.add_route("/objects/Foo/AAA", "R1");
//!
//! let response = transport
//!     .send(TransportRequest::get("http://other:9090/objects/Foo/AAA"))
//!     .await
//!     .unwrap();
//! assert_eq!(response.body, "R1");
//! assert_eq!(transport.call_count(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use hyperlog_types::Method;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::network::strip_base;
use crate::{Transport, TransportRequest, TransportResponse};

/// One call seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub method: Method,
    pub body: Option<String>,
    /// Tokio clock at the moment the call was issued.
    pub at: Instant,
}

#[derive(Debug, Clone)]
enum Scripted {
    Respond(TransportResponse),
    Fail(String),
}

/// Scripted transport: path routes, failures, optional latency, call log.
#[derive(Debug)]
pub struct MockTransport {
    name: String,
    routes: Mutex<HashMap<String, Scripted>>,
    fallback: Mutex<Option<TransportResponse>>,
    latency: Mutex<HashMap<String, Duration>>,
    default_latency: Duration,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            routes: Mutex::new(HashMap::new()),
            fallback: Mutex::new(None),
            latency: Mutex::new(HashMap::new()),
            default_latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Delay applied to every call without a per-path latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    /// Answer `path` with a 200 and `body`.
    pub fn add_route(&self, path: &str, body: impl Into<String>) {
        self.add_response(path, TransportResponse::ok(body));
    }

    pub fn add_response(&self, path: &str, response: TransportResponse) {
        self.routes
            .lock()
            .insert(path.to_string(), Scripted::Respond(response));
    }

    /// Make calls to `path` fail at the transport level.
    pub fn add_failure(&self, path: &str, message: &str) {
        self.routes
            .lock()
            .insert(path.to_string(), Scripted::Fail(message.to_string()));
    }

    /// Per-path latency, overriding the default.
    pub fn set_latency(&self, path: &str, latency: Duration) {
        self.latency.lock().insert(path.to_string(), latency);
    }

    /// Answer unrouted paths with `response` instead of failing.
    pub fn set_fallback(&self, response: TransportResponse) {
        *self.fallback.lock() = Some(response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls whose url path is `path`.
    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| strip_base(&call.url) == path)
            .count()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let path = strip_base(&request.url).to_string();
        self.calls.lock().push(RecordedCall {
            url: request.url.clone(),
            method: request.method,
            body: request.body.clone(),
            at: Instant::now(),
        });

        let latency = self
            .latency
            .lock()
            .get(&path)
            .copied()
            .unwrap_or(self.default_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.routes.lock().get(&path).cloned();
        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(anyhow!(message)),
            None => self
                .fallback
                .lock()
                .clone()
                .ok_or_else(|| anyhow!("no mock route for {}", path)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_routes_match_on_path() {
        let transport = MockTransport::new("test");
        transport.add_route("/a", "A");

        let first = transport.send(TransportRequest::get("http://h:1/a")).await.unwrap();
        let second = transport.send(TransportRequest::get("http://h:2/a")).await.unwrap();
        assert_eq!(first.body, "A");
        assert_eq!(second.body, "A");
        assert_eq!(transport.calls_to("/a"), 2);
    }

    #[tokio::test]
    async fn test_unrouted_and_failing_paths() {
        let transport = MockTransport::new("test");
        transport.add_failure("/down", "connection reset");

        let err = transport.send(TransportRequest::get("http://h/down")).await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert!(transport.send(TransportRequest::get("http://h/none")).await.is_err());

        transport.set_fallback(TransportResponse::ok("echo"));
        let response = transport.send(TransportRequest::get("http://h/none")).await.unwrap();
        assert_eq!(response.body, "echo");
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_uses_tokio_clock() {
        let transport = MockTransport::new("test").with_latency(Duration::from_millis(40));
        transport.add_route("/slow", "S");
        let start = Instant::now();
        transport.send(TransportRequest::get("http://h/slow")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
