//! Capture, paced replay and diffing of recorded sessions.
//!
//! A session is captured as a flat list of [`ReplayEvent`]s whose
//! `timestamp_offset` is relative to the first event. [`ReplayEngine::run`]
//! re-issues the requests in order against a (possibly different) server,
//! starting each one at its original offset without waiting for earlier
//! responses, and [`compare_runs`] diffs the two logs.
//!
//! # Example
//!
//! ```ignore
//! let events = ReplayEngine::capture(&store.snapshot());
//! export::save(&events, Path::new("session.json"))?;
//!
//! let run = engine.run(&events, "http://staging:9090").await?;
//! let report = ReplayReport::from_comparisons(&compare_runs(&expected, &run.entries));
//! println!("{}", report.format_report());
//! ```

pub mod compare;
pub mod export;
pub mod markup;

pub use compare::{compare, compare_runs, ComparisonStatus, LogEntryComparison, ReplayReport};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hyperlog_transport::network::rebase;
use hyperlog_types::{HyperlogConfig, Method, ResourceKey, SubType};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dispatcher::RequestDispatcher;
use crate::entry::{EventState, LogEntry};

/// Serializable, timing-relative projection of a [`LogEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEvent {
    pub url: String,
    pub method: Method,
    #[serde(default)]
    pub request: Option<String>,
    pub state: EventState,
    /// Milliseconds since the first captured event.
    pub timestamp_offset: u64,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub sub_type: SubType,
}

impl ReplayEvent {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.url.clone(), self.sub_type)
    }

    pub fn is_view(&self) -> bool {
        self.state.is_view_state()
    }
}

/// Result of one replay run.
#[derive(Debug, Clone)]
pub struct ReplayRun {
    pub target_base_url: String,
    /// Requests issued (views are not replayed).
    pub dispatched: usize,
    /// Requests whose fetch returned an error instead of an entry.
    pub failed: usize,
    /// The store's log after the run.
    pub entries: Vec<LogEntry>,
}

pub struct ReplayEngine {
    dispatcher: Arc<RequestDispatcher>,
    speed: f64,
}

impl ReplayEngine {
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            dispatcher,
            speed: 1.0,
        }
    }

    pub fn from_config(config: &HyperlogConfig, dispatcher: Arc<RequestDispatcher>) -> Self {
        Self::new(dispatcher).with_speed(config.replay_speed)
    }

    /// Pacing multiplier; non-positive values keep real time.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = if speed.is_finite() && speed > 0.0 {
            speed
        } else {
            1.0
        };
        self
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Project a log into replay events.
    ///
    /// Offsets are taken from `created_at` relative to the first entry and
    /// clamped so they never decrease.
    pub fn capture(log: &[LogEntry]) -> Vec<ReplayEvent> {
        let Some(first) = log.first() else {
            return Vec::new();
        };
        let origin = first.created_at();
        let mut previous = 0u64;
        log.iter()
            .map(|entry| {
                let offset = (entry.created_at() - origin).num_milliseconds().max(0) as u64;
                previous = previous.max(offset);
                ReplayEvent {
                    url: entry.url().to_string(),
                    method: entry.method(),
                    request: entry.request_body().map(str::to_string),
                    state: entry.state(),
                    timestamp_offset: previous,
                    response: entry.peek_response().to_string(),
                    sub_type: entry.key().map(|key| key.sub_type).unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Capture the dispatcher's current log.
    pub fn capture_store(&self) -> Vec<ReplayEvent> {
        Self::capture(&self.dispatcher.store().snapshot())
    }

    fn deadline(&self, start: Instant, offset_ms: u64) -> Instant {
        start + Duration::from_secs_f64(offset_ms as f64 / 1000.0 / self.speed)
    }

    /// Reset the store and re-issue `events` against `target_base_url`.
    ///
    /// Each request starts at `run start + offset / speed` and is not awaited
    /// before the next one is scheduled; the run returns once all of them
    /// (and any fan-in they trigger) have settled.
    pub async fn run(&self, events: &[ReplayEvent], target_base_url: &str) -> Result<ReplayRun> {
        export::validate(events)?;
        self.dispatcher.store().reset();
        info!(events = events.len(), target = target_base_url, speed = self.speed, "Replay started");

        let start = Instant::now();
        let mut handles = Vec::new();
        for (index, event) in events.iter().enumerate() {
            if event.is_view() {
                continue;
            }
            tokio::time::sleep_until(self.deadline(start, event.timestamp_offset)).await;

            let key = ResourceKey::new(rebase(&event.url, target_base_url), event.sub_type);
            debug!(index, offset_ms = event.timestamp_offset, url = %key.url, method = %event.method, "Replaying event");
            let dispatcher = self.dispatcher.clone();
            let method = event.method;
            let body = event.request.clone();
            handles.push(tokio::spawn(async move {
                dispatcher.fetch(key, method, body, None).await
            }));
        }

        let dispatched = handles.len();
        let mut failed = 0;
        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    failed += 1;
                    warn!(error = %err, "Replayed request failed");
                }
                Err(err) => {
                    failed += 1;
                    warn!(error = %err, "Replay task aborted");
                }
            }
        }

        info!(
            dispatched,
            failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Replay finished"
        );
        Ok(ReplayRun {
            target_base_url: target_base_url.trim_end_matches('/').to_string(),
            dispatched,
            failed,
            entries: self.dispatcher.store().snapshot(),
        })
    }

    /// Replay `expected` against `target_base_url` and diff the result.
    pub async fn replay_and_compare(
        &self,
        expected: &[LogEntry],
        target_base_url: &str,
    ) -> Result<(Vec<LogEntryComparison>, ReplayReport)> {
        let events = Self::capture(expected);
        let run = self.run(&events, target_base_url).await?;
        let comparisons = compare_runs(expected, &run.entries);
        for comparison in &comparisons {
            if comparison.status != ComparisonStatus::Match {
                debug!(
                    status = %comparison.status,
                    method = %comparison.method,
                    path = %comparison.path,
                    detail = comparison.detail.as_deref().unwrap_or(""),
                    "Replay difference"
                );
            }
        }
        let report = ReplayReport::from_comparisons(&comparisons);
        Ok((comparisons, report))
    }
}

impl std::fmt::Debug for ReplayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayEngine")
            .field("speed", &self.speed)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
