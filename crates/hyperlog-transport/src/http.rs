//! Blocking HTTP transport over `ureq`.
//!
//! Each call runs on tokio's blocking pool so the event loop keeps serving
//! cached lookups and replay timers while a request is on the wire.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::Engine;
use hyperlog_types::HyperlogConfig;
use tracing::{debug, trace};

use crate::{Transport, TransportRequest, TransportResponse};

/// HTTP client with fixed timeouts and optional basic auth.
#[derive(Clone)]
pub struct HttpTransport {
    agent: ureq::Agent,
    authorization: Option<String>,
}

impl HttpTransport {
    /// Client with the default config (no credentials).
    pub fn new() -> Self {
        Self::from_config(&HyperlogConfig::default())
    }

    pub fn from_config(config: &HyperlogConfig) -> Self {
        let transport = Self::with_timeouts(config.timeout(), config.connect_timeout());
        match (&config.user, &config.password) {
            (Some(user), password) => {
                transport.with_basic_auth(user, password.as_deref().unwrap_or(""))
            }
            _ => transport,
        }
    }

    pub fn with_timeouts(timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(timeout)
                .timeout_connect(connect_timeout)
                .build(),
            authorization: None,
        }
    }

    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        let token =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, password));
        self.authorization = Some(format!("Basic {}", token));
        self
    }

    fn send_blocking(
        agent: &ureq::Agent,
        authorization: Option<&str>,
        request: &TransportRequest,
    ) -> Result<TransportResponse> {
        let mut call = agent.request(request.method.as_str(), &request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }
        if let Some(auth) = authorization {
            call = call.set("Authorization", auth);
        }

        let outcome = match &request.body {
            Some(body) => call.send_string(body),
            None => call.call(),
        };

        match outcome {
            Ok(response) => {
                let status = response.status();
                let body = response
                    .into_string()
                    .with_context(|| format!("Failed to read response body: {}", request.url))?;
                Ok(TransportResponse { status, body })
            }
            // Error statuses still carry a body worth logging.
            Err(ureq::Error::Status(status, response)) => Ok(TransportResponse {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(err)) => {
                Err(anyhow!("{} {} failed: {}", request.method, request.url, err))
            }
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let agent = self.agent.clone();
        let authorization = self.authorization.clone();
        let started = std::time::Instant::now();
        trace!(url = %request.url, method = %request.method, "http request");

        let url = request.url.clone();
        let response = tokio::task::spawn_blocking(move || {
            Self::send_blocking(&agent, authorization.as_deref(), &request)
        })
        .await
        .with_context(|| format!("HTTP worker for {} did not complete", url))??;

        debug!(
            url = %url,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "http response"
        );
        Ok(response)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        let transport = HttpTransport::new().with_basic_auth("sven", "pass");
        assert_eq!(transport.authorization.as_deref(), Some("Basic c3ZlbjpwYXNz"));
    }

    #[test]
    fn test_from_config_without_user_has_no_auth() {
        let transport = HttpTransport::from_config(&HyperlogConfig::default());
        assert!(transport.authorization.is_none());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let transport = HttpTransport::new().with_basic_auth("sven", "pass");
        let rendered = format!("{:?}", transport);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("c3Zl"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_err() {
        let transport = HttpTransport::with_timeouts(Duration::from_secs(2), Duration::from_secs(1));
        let result = transport
            .send(TransportRequest::get("http://127.0.0.1:9/unreachable"))
            .await;
        assert!(result.is_err());
    }
}
