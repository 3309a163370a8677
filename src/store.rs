//! Append-ordered event log with cache lookup.
//!
//! The log is the single source of truth for two things: which recorded
//! response answers a lookup (the earliest match wins) and the relative timing
//! replay reproduces. Entries are appended and searched, never reordered.
//!
//! # Locking
//!
//! The list lock is always taken before an entry lock, and neither is held
//! while aggregators or observers run: they receive a cloned snapshot of the
//! entry after every transition.

use std::sync::Arc;

use hyperlog_transport::network::strip_base;
use hyperlog_types::key::urls_equivalent;
use hyperlog_types::{Method, ResourceKey};
use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::aggregator::Aggregator;
use crate::entry::{EventState, LogEntry, SharedEntry};
use crate::error::HyperlogError;

/// Urls in a comparable form: when exactly one side is relative, both lose
/// their base.
fn comparable<'a>(left: &'a str, right: &'a str) -> (&'a str, &'a str) {
    if left.starts_with('/') != right.starts_with('/') {
        (strip_base(left), strip_base(right))
    } else {
        (left, right)
    }
}

/// External collaborator told about every entry transition.
pub trait StatusObserver: Send + Sync {
    fn update_status(&self, entry: &LogEntry);
}

/// Outcome of a cache lookup for one request.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// A resolved entry (or open view) can answer the request.
    Cached(SharedEntry),
    /// A matching request is still in flight.
    InFlight(SharedEntry),
    Miss,
}

#[derive(Default)]
pub struct EventStore {
    entries: RwLock<Vec<SharedEntry>>,
    observers: RwLock<Vec<Arc<dyn StatusObserver>>>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&self, observer: Arc<dyn StatusObserver>) {
        self.observers.write().push(observer);
    }

    // ==================== Lookup ====================

    /// Volatile keys match by equivalence, all others exactly. A relative
    /// url and an absolute one are compared by path, so a resource recorded
    /// either way answers both.
    fn matches(entry: &LogEntry, key: &ResourceKey) -> bool {
        let Some(candidate) = entry.key() else {
            return false;
        };
        if candidate.sub_type != key.sub_type {
            return false;
        }
        let (left, right) = comparable(&candidate.url, &key.url);
        if key.is_volatile() {
            urls_equivalent(left, right)
        } else {
            left == right
        }
    }

    fn find_where(&self, predicate: impl Fn(&LogEntry) -> bool) -> Option<SharedEntry> {
        self.entries
            .read()
            .iter()
            .find(|shared| predicate(&*shared.read()))
            .cloned()
    }

    /// First request entry in log order matching `key`. Entries invalidated
    /// by a mutation are skipped.
    pub fn find(&self, key: &ResourceKey) -> Option<SharedEntry> {
        self.find_where(|entry| {
            entry.state() != EventState::Reload && Self::matches(entry, key)
        })
    }

    fn find_view(&self, title: &str) -> Option<SharedEntry> {
        self.find_where(|entry| entry.is_view() && entry.title() == title)
    }

    /// A resolved entry whose recorded outcome can be replayed to a caller.
    fn answerable(entry: &LogEntry) -> bool {
        entry.has_response() && entry.classification() == Some(EventState::Success)
    }

    /// Resolved entry that may answer a `method` request for `key`, or the
    /// in-flight entry it should join. Failed entries never answer, so a
    /// later successful retry is found behind them.
    pub fn lookup(&self, key: &ResourceKey, method: Method) -> Lookup {
        if let Some(view) = self.find_view(&key.url) {
            if view.read().state() == EventState::View {
                return Lookup::Cached(view);
            }
        }
        let candidate = self.find_where(|entry| {
            entry.method() == method
                && entry.state() != EventState::Reload
                && (entry.is_running() || Self::answerable(entry))
                && Self::matches(entry, key)
        });
        match candidate {
            Some(shared) if shared.read().is_running() => Lookup::InFlight(shared),
            Some(shared) => Lookup::Cached(shared),
            None => Lookup::Miss,
        }
    }

    /// True when a recorded response (or an open view) answers the request.
    pub fn is_cached(&self, key: &ResourceKey, method: Method) -> bool {
        matches!(self.lookup(key, method), Lookup::Cached(_))
    }

    // ==================== Requests ====================

    /// Append a `RUNNING` entry.
    pub fn start(
        &self,
        key: ResourceKey,
        method: Method,
        body: Option<String>,
        aggregator: Option<Arc<dyn Aggregator>>,
    ) -> SharedEntry {
        let mut entry = LogEntry::running(key, method, body);
        if let Some(aggregator) = aggregator {
            entry.add_aggregator(aggregator);
        }
        debug!(url = entry.url(), method = %method, "Request started");
        let shared = entry.into_shared();
        self.entries.write().push(shared.clone());
        self.notify_observers(&shared);
        shared
    }

    /// First `RUNNING` entry for `key`.
    fn find_running(&self, key: &ResourceKey) -> Result<SharedEntry, HyperlogError> {
        self.find_where(|entry| entry.is_running() && Self::matches(entry, key))
            .ok_or_else(|| {
                error!(url = %key.url, "No running entry to resolve");
                HyperlogError::NotFoundForUpdate {
                    url: key.url.clone(),
                }
            })
    }

    /// Resolve the pending entry for `key` with a response body.
    pub fn end(&self, key: &ResourceKey, body: impl Into<String>) -> Result<SharedEntry, HyperlogError> {
        let shared = self.find_running(key)?;
        self.complete(&shared, body)?;
        Ok(shared)
    }

    /// Resolve the pending entry for `key` as failed.
    pub fn fault(&self, key: &ResourceKey, message: impl Into<String>) -> Result<SharedEntry, HyperlogError> {
        let shared = self.find_running(key)?;
        self.fail(&shared, message)?;
        Ok(shared)
    }

    /// `RUNNING -> SUCCESS` on a known entry, then notify its aggregators.
    pub fn complete(&self, shared: &SharedEntry, body: impl Into<String>) -> Result<(), HyperlogError> {
        {
            let mut entry = shared.write();
            entry.set_success(body).map_err(|err| {
                error!(title = entry.title(), error = %err, "Rejected second resolution");
                err
            })?;
            debug!(
                url = entry.url(),
                elapsed_ms = entry.duration_ms().unwrap_or_default(),
                bytes = entry.peek_response().len(),
                "Request succeeded"
            );
        }
        self.notify(shared);
        Ok(())
    }

    /// `RUNNING -> ERROR` on a known entry. Aggregators still hear about it
    /// so they can settle into a failure state.
    pub fn fail(&self, shared: &SharedEntry, message: impl Into<String>) -> Result<(), HyperlogError> {
        {
            let mut entry = shared.write();
            let message = message.into();
            entry.set_error(message.as_str()).map_err(|err| {
                error!(title = entry.title(), error = %err, "Rejected second resolution");
                err
            })?;
            debug!(url = entry.url(), fault = %message, "Request failed");
        }
        self.notify(shared);
        Ok(())
    }

    /// Attach another consumer to an existing entry.
    pub fn attach(&self, shared: &SharedEntry, aggregator: Arc<dyn Aggregator>) {
        shared.write().add_aggregator(aggregator);
    }

    /// Serve a recorded response: counts the hit, marks the entry
    /// `DUPLICATE` and returns the body.
    pub fn serve_cached(&self, shared: &SharedEntry) -> String {
        let body = {
            let mut entry = shared.write();
            let body = entry.retrieve_response().to_string();
            entry.mark_duplicate();
            trace!(url = entry.url(), hits = entry.cache_hits(), "Served from cache");
            body
        };
        self.notify_observers(shared);
        body
    }

    /// Invalidate the earliest live `method` entry for `key`. Returns whether
    /// one was found.
    pub fn mark_reload(&self, key: &ResourceKey, method: Method) -> bool {
        let Some(shared) = self.find_where(|entry| {
            entry.method() == method
                && entry.state() != EventState::Reload
                && Self::answerable(entry)
                && Self::matches(entry, key)
        }) else {
            return false;
        };
        {
            let mut entry = shared.write();
            entry.mark_reload();
            debug!(url = entry.url(), "Entry marked for reload");
        }
        self.notify_observers(&shared);
        true
    }

    // ==================== Views ====================

    /// Open (or reopen) the synthetic entry for a UI panel.
    pub fn add_view(&self, title: &str, aggregator: Option<Arc<dyn Aggregator>>) -> SharedEntry {
        let shared = match self.find_view(title) {
            Some(existing) => {
                existing.write().reopen();
                debug!(title, "View reopened");
                existing
            }
            None => {
                let shared = LogEntry::view(title).into_shared();
                self.entries.write().push(shared.clone());
                debug!(title, "View opened");
                shared
            }
        };
        if let Some(aggregator) = aggregator {
            shared.write().add_aggregator(aggregator);
        }
        self.notify_observers(&shared);
        shared
    }

    /// Close a view and reset every aggregator that was attached to it.
    pub fn close_view(&self, title: &str) -> Result<(), HyperlogError> {
        let shared = self.find_view(title).ok_or_else(|| HyperlogError::UnknownView {
            title: title.to_string(),
        })?;
        let aggregators = shared.write().close();
        for aggregator in &aggregators {
            aggregator.reset();
        }
        let detached = self.detach(&aggregators);
        debug!(title, reset = aggregators.len(), detached, "View closed");
        self.notify_observers(&shared);
        Ok(())
    }

    /// Remove `aggregators` from every resolved entry. Running entries keep
    /// them until they resolve, so the late update is seen (and discarded)
    /// before the entry prunes it.
    fn detach(&self, aggregators: &[Arc<dyn Aggregator>]) -> usize {
        if aggregators.is_empty() {
            return 0;
        }
        let entries = self.entries.read();
        let mut detached = 0;
        for shared in entries.iter() {
            let mut entry = shared.write();
            if entry.is_running() {
                continue;
            }
            for aggregator in aggregators {
                if entry.detach_aggregator(aggregator) {
                    detached += 1;
                }
            }
        }
        detached
    }

    // ==================== Log ====================

    /// Drop the whole log.
    pub fn reset(&self) {
        let dropped = {
            let mut entries = self.entries.write();
            let dropped = entries.len();
            entries.clear();
            dropped
        };
        debug!(dropped, "Event store reset");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Shared handles in log order.
    pub fn entries(&self) -> Vec<SharedEntry> {
        self.entries.read().clone()
    }

    /// Point-in-time copy of the log.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .iter()
            .map(|shared| shared.read().clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<LogEntry> {
        self.snapshot()
            .into_iter()
            .filter(|entry| !entry.is_view())
            .collect()
    }

    pub fn views(&self) -> Vec<LogEntry> {
        self.snapshot()
            .into_iter()
            .filter(LogEntry::is_view)
            .collect()
    }

    pub fn total_cache_hits(&self) -> u64 {
        self.entries
            .read()
            .iter()
            .map(|shared| shared.read().cache_hits())
            .sum()
    }

    // ==================== Notification ====================

    /// Every attached aggregator, then every observer.
    fn notify(&self, shared: &SharedEntry) {
        let snapshot = shared.read().clone();
        for aggregator in snapshot.aggregators() {
            aggregator.update(&snapshot);
        }
        if snapshot.aggregators().iter().any(|aggregator| aggregator.is_closed()) {
            shared.write().prune_closed_aggregators();
        }
        self.observe(&snapshot);
    }

    fn notify_observers(&self, shared: &SharedEntry) {
        let snapshot = shared.read().clone();
        self.observe(&snapshot);
    }

    fn observe(&self, snapshot: &LogEntry) {
        let observers = self.observers.read().clone();
        for observer in observers {
            observer.update_status(snapshot);
        }
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("entries", &self.len())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}
