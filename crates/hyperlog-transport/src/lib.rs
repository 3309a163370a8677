//! hyperlog transport layer
//!
//! The request core never talks to the network directly; it goes through the
//! [`Transport`] trait so tests and replays can swap the wire out.
//!
//! This crate provides:
//! - [`Transport`]: async request seam
//! - [`http`]: blocking `ureq` client run off the event loop
//! - `mock`: scripted transport recording every call (`testing` feature)
//! - [`network`]: base-url helpers used for rebasing and diffing
//!
//! # Example
//!
//! ```ignore
//! use hyperlog_transport::{HttpTransport, Transport, TransportRequest};
//! use hyperlog_types::HyperlogConfig;
//!
//! let transport = HttpTransport::from_config(&HyperlogConfig::from_env());
//! let response = transport
//!     .send(TransportRequest::get("http://localhost:8080/restful/"))
//!     .await?;
//! ```

pub mod http;
#[cfg(any(test, feature = "testing"))]
pub mod mock;
pub mod network;

pub use http::HttpTransport;
#[cfg(any(test, feature = "testing"))]
pub use mock::{MockTransport, RecordedCall};

use anyhow::Result;
use hyperlog_types::{Method, SubType};
use serde::{Deserialize, Serialize};

/// One outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl TransportRequest {
    pub fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, Method::Get)
    }

    pub fn with_body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Sets `Accept` for the requested response variant.
    pub fn accepting(self, sub_type: SubType) -> Self {
        self.with_header("Accept", sub_type.accept_header())
    }
}

/// Inbound response. Non-2xx statuses are still responses; see [`fault`](Self::fault).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    /// Fault message if the response is error-shaped.
    ///
    /// Error-shaped means an HTTP status of 400 or above, or a JSON body whose
    /// `httpStatusCode` is 400 or above (servers that wrap failures in a 200).
    pub fn fault(&self) -> Option<String> {
        if self.status >= 400 {
            let detail = self.body.trim();
            return Some(if detail.is_empty() {
                format!("HTTP {}", self.status)
            } else {
                format!("HTTP {}: {}", self.status, detail)
            });
        }
        error_shaped_body(&self.body)
    }
}

fn error_shaped_body(body: &str) -> Option<String> {
    let trimmed = body.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
    let code = value.get("httpStatusCode").and_then(|c| c.as_u64())?;
    if code < 400 {
        return None;
    }
    let message = value
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("server reported an error");
    Some(format!("HTTP {}: {}", code, message))
}

/// Request seam between the core and the wire.
///
/// `Err` means the call itself failed (connection refused, timeout); an
/// error-shaped answer is an `Ok` response whose [`TransportResponse::fault`]
/// is `Some`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse>;

    /// Name for logging.
    fn name(&self) -> &str;
}
