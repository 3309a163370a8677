//! Log entries and their state machine.
//!
//! ```text
//! INITIAL ──start──▶ RUNNING ──set_success──▶ SUCCESS ─┬─▶ DUPLICATE (served from cache)
//!                         └────set_error────▶ ERROR   ─┴─▶ RELOAD    (invalidated)
//!
//! VIEW ──close──▶ CLOSED ──reopen──▶ VIEW
//! ```
//!
//! `DUPLICATE` and `RELOAD` are display states layered on top of a resolved
//! entry; the underlying SUCCESS/ERROR classification is kept in
//! [`Outcome`] and is what replay diffing looks at.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hyperlog_types::{Method, ResourceKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::aggregator::Aggregator;
use crate::error::HyperlogError;
use crate::handler::Projection;

/// Entries are shared between the store, dispatcher and replay snapshots.
pub type SharedEntry = Arc<RwLock<LogEntry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventState {
    Initial,
    Running,
    Success,
    Error,
    View,
    Closed,
    Duplicate,
    Reload,
    Missing,
}

impl EventState {
    pub fn is_view_state(&self) -> bool {
        matches!(self, EventState::View | EventState::Closed)
    }
}

/// How a request entry settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Error(String),
}

/// One recorded request/response pair or UI view.
#[derive(Clone)]
pub struct LogEntry {
    title: String,
    key: Option<ResourceKey>,
    method: Method,
    request: Option<String>,
    response: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    cache_hits: u64,
    state: EventState,
    outcome: Option<Outcome>,
    aggregators: Vec<Arc<dyn Aggregator>>,
    payload: Option<Arc<Projection>>,
}

impl LogEntry {
    /// New request entry in `INITIAL`, titled by its url.
    pub fn request(key: ResourceKey, method: Method, request: Option<String>) -> Self {
        Self {
            title: key.url.clone(),
            key: Some(key),
            method,
            request,
            response: String::new(),
            created_at: Utc::now(),
            updated_at: None,
            duration_ms: None,
            cache_hits: 0,
            state: EventState::Initial,
            outcome: None,
            aggregators: Vec::new(),
            payload: None,
        }
    }

    /// New request entry already in `RUNNING`, as the store appends it.
    pub fn running(key: ResourceKey, method: Method, request: Option<String>) -> Self {
        Self {
            state: EventState::Running,
            ..Self::request(key, method, request)
        }
    }

    /// New synthetic view entry in `VIEW`.
    pub fn view(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            key: None,
            method: Method::Get,
            request: None,
            response: String::new(),
            created_at: Utc::now(),
            updated_at: None,
            duration_ms: None,
            cache_hits: 0,
            state: EventState::View,
            outcome: None,
            aggregators: Vec::new(),
            payload: None,
        }
    }

    /// Override the creation stamp (imports, fixtures).
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn into_shared(self) -> SharedEntry {
        Arc::new(RwLock::new(self))
    }

    // ==================== Transitions ====================

    /// `INITIAL -> RUNNING`.
    pub fn start(&mut self) -> Result<(), HyperlogError> {
        self.require(EventState::Initial)?;
        self.state = EventState::Running;
        Ok(())
    }

    /// `RUNNING -> SUCCESS`: records the body, stamps `updated_at` and the duration.
    ///
    /// Aggregator notification is driven by the store once the entry lock is
    /// released.
    pub fn set_success(&mut self, response: impl Into<String>) -> Result<(), HyperlogError> {
        self.require(EventState::Running)?;
        self.response = response.into();
        self.outcome = Some(Outcome::Success);
        self.state = EventState::Success;
        self.stamp_update(Utc::now());
        Ok(())
    }

    /// `RUNNING -> ERROR` with a fault message. The response stays empty.
    pub fn set_error(&mut self, message: impl Into<String>) -> Result<(), HyperlogError> {
        self.require(EventState::Running)?;
        self.outcome = Some(Outcome::Error(message.into()));
        self.state = EventState::Error;
        self.stamp_update(Utc::now());
        Ok(())
    }

    /// Override the resolution stamp (imports, fixtures).
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.stamp_update(updated_at);
        self
    }

    fn stamp_update(&mut self, at: DateTime<Utc>) {
        self.updated_at = Some(at);
        self.duration_ms = Some((at - self.created_at).num_milliseconds().max(0));
    }

    fn require(&self, expected: EventState) -> Result<(), HyperlogError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(HyperlogError::AlreadyResolved {
                title: self.title.clone(),
                state: self.state,
            })
        }
    }

    /// Served from cache. Only resolved entries change state.
    pub fn mark_duplicate(&mut self) {
        if self.outcome.is_some() {
            self.state = EventState::Duplicate;
        }
    }

    /// Invalidated: the next lookup must not be served from this entry.
    pub fn mark_reload(&mut self) {
        if !self.state.is_view_state() {
            self.state = EventState::Reload;
        }
    }

    /// No counterpart was found during replay comparison.
    pub fn mark_missing(&mut self) {
        self.state = EventState::Missing;
    }

    /// `VIEW -> CLOSED`. Returns the aggregators that were attached.
    pub fn close(&mut self) -> Vec<Arc<dyn Aggregator>> {
        if self.state == EventState::View {
            self.state = EventState::Closed;
            self.updated_at = Some(Utc::now());
        }
        std::mem::take(&mut self.aggregators)
    }

    /// `CLOSED -> VIEW`.
    pub fn reopen(&mut self) {
        if self.state == EventState::Closed {
            self.state = EventState::View;
        }
    }

    /// Attach a consumer; the same aggregator is never attached twice.
    pub fn add_aggregator(&mut self, aggregator: Arc<dyn Aggregator>) {
        if !self
            .aggregators
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &aggregator))
        {
            self.aggregators.push(aggregator);
        }
    }

    /// Drop `aggregator` from this entry. Returns whether it was attached.
    pub fn detach_aggregator(&mut self, aggregator: &Arc<dyn Aggregator>) -> bool {
        let before = self.aggregators.len();
        self.aggregators
            .retain(|existing| !Arc::ptr_eq(existing, aggregator));
        self.aggregators.len() != before
    }

    /// Drop every aggregator that was reset and has not been reopened.
    pub fn prune_closed_aggregators(&mut self) {
        self.aggregators.retain(|aggregator| !aggregator.is_closed());
    }

    /// Read the response body, counting the access as a cache hit.
    pub fn retrieve_response(&mut self) -> &str {
        self.cache_hits += 1;
        &self.response
    }

    /// Read the body without counting a hit. Reserved for fan-in bookkeeping
    /// and replay diffing; views go through [`retrieve_response`](Self::retrieve_response).
    pub fn peek_response(&self) -> &str {
        &self.response
    }

    pub fn set_payload(&mut self, payload: Projection) {
        self.payload = Some(Arc::new(payload));
    }

    // ==================== Accessors ====================

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn key(&self) -> Option<&ResourceKey> {
        self.key.as_ref()
    }

    /// Url of a request entry; the title for views.
    pub fn url(&self) -> &str {
        self.key.as_ref().map(|k| k.url.as_str()).unwrap_or(self.title.as_str())
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn request_body(&self) -> Option<&str> {
        self.request.as_deref()
    }

    pub fn has_response(&self) -> bool {
        !self.response.is_empty()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_ms
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn state(&self) -> EventState {
        self.state
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// SUCCESS/ERROR regardless of a DUPLICATE/RELOAD overlay.
    pub fn classification(&self) -> Option<EventState> {
        match self.outcome {
            Some(Outcome::Success) => Some(EventState::Success),
            Some(Outcome::Error(_)) => Some(EventState::Error),
            None => None,
        }
    }

    pub fn fault_message(&self) -> Option<&str> {
        match &self.outcome {
            Some(Outcome::Error(message)) => Some(message),
            _ => None,
        }
    }

    pub fn is_view(&self) -> bool {
        self.key.is_none()
    }

    pub fn is_running(&self) -> bool {
        self.state == EventState::Running
    }

    pub fn aggregators(&self) -> &[Arc<dyn Aggregator>] {
        &self.aggregators
    }

    pub fn payload(&self) -> Option<&Arc<Projection>> {
        self.payload.as_ref()
    }
}

impl fmt::Debug for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEntry")
            .field("title", &self.title)
            .field("method", &self.method)
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .field("response_len", &self.response.len())
            .field("cache_hits", &self.cache_hits)
            .field(
                "aggregators",
                &self.aggregators.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
