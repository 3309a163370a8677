//! Connection and replay settings.
//!
//! Configuration sources, in the order callers usually apply them:
//!
//! 1. [`HyperlogConfig::default`]
//! 2. [`HyperlogConfig::from_file`] (JSON)
//! 3. [`HyperlogConfig::from_env`] (`HYPERLOG_*` variables)
//! 4. `with_*` overrides in code

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::env::{env_string, env_string_or, env_var_or};

/// Default server the client talks to.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Settings shared by the transport, dispatcher and replay engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HyperlogConfig {
    /// Scheme, host and port of the server (no trailing slash).
    pub base_url: String,
    /// Basic-auth user, if the server requires one.
    pub user: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Replay pacing multiplier: 2.0 replays twice as fast as recorded.
    pub replay_speed: f64,
}

impl Default for HyperlogConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user: None,
            password: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            replay_speed: 1.0,
        }
    }
}

impl HyperlogConfig {
    /// Read `HYPERLOG_*` environment variables on top of the defaults.
    ///
    /// - `HYPERLOG_BASE_URL`
    /// - `HYPERLOG_USER` / `HYPERLOG_PASSWORD`
    /// - `HYPERLOG_TIMEOUT_SECS` / `HYPERLOG_CONNECT_TIMEOUT_SECS`
    /// - `HYPERLOG_REPLAY_SPEED`
    pub fn from_env() -> Self {
        Self::from_env_prefixed("HYPERLOG")
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable prefix.
    pub fn from_env_prefixed(prefix: &str) -> Self {
        let defaults = Self::default();
        let var = |name: &str| format!("{}_{}", prefix, name);
        Self {
            base_url: trim_base(&env_string_or(&var("BASE_URL"), &defaults.base_url)),
            user: env_string(&var("USER")),
            password: env_string(&var("PASSWORD")),
            timeout_secs: env_var_or(&var("TIMEOUT_SECS"), defaults.timeout_secs),
            connect_timeout_secs: env_var_or(
                &var("CONNECT_TIMEOUT_SECS"),
                defaults.connect_timeout_secs,
            ),
            replay_speed: sanitize_speed(env_var_or(&var("REPLAY_SPEED"), defaults.replay_speed)),
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config JSON: {}", path.display()))?;
        config.base_url = trim_base(&config.base_url);
        config.replay_speed = sanitize_speed(config.replay_speed);
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = trim_base(base_url);
        self
    }

    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.user = Some(user.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_timeouts(mut self, timeout_secs: u64, connect_timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self.connect_timeout_secs = connect_timeout_secs;
        self
    }

    pub fn with_replay_speed(mut self, speed: f64) -> Self {
        self.replay_speed = sanitize_speed(speed);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Non-finite or non-positive speeds fall back to real time.
fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}
