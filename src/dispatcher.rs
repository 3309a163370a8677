//! Request façade: answer from the log or go to the wire.
//!
//! [`RequestDispatcher::fetch`] drives one fan-in task to completion. The
//! requested resource and every child its aggregators discover along the way
//! are processed from a single worklist, with live calls running concurrently
//! and handled in completion order:
//!
//! ```text
//! worklist ──▶ lookup ─┬─ cached ───▶ serve, update aggregator ──┐
//!                      ├─ in flight ▶ attach to running entry    │
//!                      └─ miss ─────▶ start + transport call ─▶ end/fault
//!                                                                │
//!              ◀──────────── take_pending() of every aggregator ◀┘
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use hyperlog_transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
use hyperlog_types::{HyperlogConfig, Method, ResourceKey};
use tracing::{debug, trace, warn};

use crate::aggregator::Aggregator;
use crate::entry::SharedEntry;
use crate::error::HyperlogError;
use crate::handler::{NoopHandler, ResponseHandler};
use crate::metrics::CacheMetrics;
use crate::store::{EventStore, Lookup};

type InFlight = Pin<Box<dyn Future<Output = (SharedEntry, Result<TransportResponse>)> + Send>>;

/// Entries put on the wire by one `fetch`. Whatever is still `RUNNING` when
/// the fetch is dropped is failed, so joiners are not left waiting.
struct Started<'a> {
    store: &'a EventStore,
    entries: Vec<SharedEntry>,
}

impl<'a> Started<'a> {
    fn new(store: &'a EventStore) -> Self {
        Self {
            store,
            entries: Vec::new(),
        }
    }
}

impl Drop for Started<'_> {
    fn drop(&mut self) {
        for shared in self.entries.drain(..) {
            let url = {
                let entry = shared.read();
                if !entry.is_running() {
                    continue;
                }
                entry.url().to_string()
            };
            warn!(url = %url, "Fetch dropped with request in flight");
            let fault = HyperlogError::TransportFailure {
                url,
                message: "request abandoned before completion".to_string(),
            };
            let _ = self.store.fail(&shared, fault.to_string());
        }
    }
}

/// One unit of work: a resource and the aggregator it is fetched for.
struct Job {
    key: ResourceKey,
    method: Method,
    body: Option<String>,
    aggregator: Option<Arc<dyn Aggregator>>,
}

pub struct RequestDispatcher {
    store: Arc<EventStore>,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn ResponseHandler>,
    metrics: CacheMetrics,
    base_url: String,
}

impl RequestDispatcher {
    pub fn new(store: Arc<EventStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            handler: Arc::new(NoopHandler),
            metrics: CacheMetrics::new(),
            base_url: HyperlogConfig::default().base_url,
        }
    }

    /// HTTP dispatcher for the configured server.
    pub fn from_config(config: &HyperlogConfig, store: Arc<EventStore>) -> Self {
        Self::new(store, Arc::new(HttpTransport::from_config(config))).with_base_url(&config.base_url)
    }

    pub fn with_handler(mut self, handler: Arc<dyn ResponseHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Prefix for relative urls (`/objects/...`).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET` without aggregator.
    pub async fn get(&self, url: &str) -> Result<SharedEntry> {
        self.fetch(ResourceKey::json(url), Method::Get, None, None)
            .await
    }

    /// Fetch `key` and, transitively, every child its aggregator requires.
    ///
    /// Returns the entry for `key` once the worklist is empty. When the
    /// request joined another in-flight call, that call's owner finishes it
    /// (and its children) and the returned entry may still be `RUNNING`.
    /// Dropping the owner's future faults its unfinished entries.
    pub async fn fetch(
        &self,
        key: ResourceKey,
        method: Method,
        body: Option<String>,
        aggregator: Option<Arc<dyn Aggregator>>,
    ) -> Result<SharedEntry> {
        let key = self.absolute(key);
        if let Some(aggregator) = &aggregator {
            aggregator.expect(&key);
        }

        let mut worklist = VecDeque::from([Job {
            key,
            method,
            body,
            aggregator,
        }]);
        let mut in_flight: FuturesUnordered<InFlight> = FuturesUnordered::new();
        let mut started = Started::new(&self.store);
        let mut root: Option<SharedEntry> = None;

        loop {
            while let Some(job) = worklist.pop_front() {
                let entry = self.begin(job, &mut worklist, &mut in_flight, &mut started)?;
                root.get_or_insert(entry);
            }
            let Some((entry, result)) = in_flight.next().await else {
                break;
            };
            self.settle(&entry, result)?;
            Self::drain_children(&entry, &mut worklist);
        }

        root.ok_or_else(|| anyhow::anyhow!("fetch finished without a root entry"))
    }

    /// Start one job: serve it, join it, or put it on the wire.
    fn begin(
        &self,
        job: Job,
        worklist: &mut VecDeque<Job>,
        in_flight: &mut FuturesUnordered<InFlight>,
        started: &mut Started<'_>,
    ) -> Result<SharedEntry> {
        let Job {
            key,
            method,
            body,
            aggregator,
        } = job;
        let key = self.absolute(key);

        if method == Method::Put {
            // A mutation must not be answered from the log, and the next GET
            // of the same resource must go to the wire too.
            if self.store.mark_reload(&key, Method::Get) {
                self.metrics.record_reload();
            }
        } else {
            match self.store.lookup(&key, method) {
                Lookup::Cached(shared) => {
                    self.serve_cached(&shared, aggregator, worklist);
                    return Ok(shared);
                }
                Lookup::InFlight(shared) => {
                    if self.join(&shared, aggregator.clone()) {
                        return Ok(shared);
                    }
                    // Resolved between lookup and join.
                    if let Lookup::Cached(shared) = self.store.lookup(&key, method) {
                        self.serve_cached(&shared, aggregator, worklist);
                        return Ok(shared);
                    }
                }
                Lookup::Miss => {}
            }
        }

        let request = self.request_for(&key, method, body.clone());
        let shared = self.store.start(key, method, body, aggregator);
        started.entries.push(shared.clone());
        self.metrics.record_live_fetch();
        debug!(url = %request.url, method = %method, transport = self.transport.name(), "Live fetch");

        let transport = self.transport.clone();
        let entry = shared.clone();
        in_flight.push(Box::pin(async move {
            let started = Instant::now();
            let result = transport.send(request).await;
            trace!(elapsed_ms = started.elapsed().as_millis() as u64, "Transport returned");
            (entry, result)
        }));
        Ok(shared)
    }

    /// Attach to a running entry. `false` if it resolved in the meantime.
    fn join(&self, shared: &SharedEntry, aggregator: Option<Arc<dyn Aggregator>>) -> bool {
        let mut entry = shared.write();
        if !entry.is_running() {
            return false;
        }
        if let Some(aggregator) = aggregator {
            entry.add_aggregator(aggregator);
        }
        self.metrics.record_join();
        trace!(url = entry.url(), "Joined in-flight request");
        true
    }

    fn serve_cached(
        &self,
        shared: &SharedEntry,
        aggregator: Option<Arc<dyn Aggregator>>,
        worklist: &mut VecDeque<Job>,
    ) {
        self.store.serve_cached(shared);
        self.metrics.record_cache_hit();
        match aggregator {
            Some(aggregator) => {
                self.store.attach(shared, aggregator.clone());
                let snapshot = shared.read().clone();
                aggregator.update(&snapshot);
                Self::queue_children(&aggregator, worklist);
            }
            None => self.apply_handler(shared),
        }
    }

    /// Anchor relative urls (`/objects/...`) at the base url, so the log only
    /// holds absolute keys.
    fn absolute(&self, mut key: ResourceKey) -> ResourceKey {
        if key.url.starts_with('/') {
            key.url = format!("{}{}", self.base_url, key.url);
        }
        key
    }

    fn request_for(&self, key: &ResourceKey, method: Method, body: Option<String>) -> TransportRequest {
        TransportRequest::new(key.url.clone(), method)
            .accepting(key.sub_type)
            .with_body(body)
    }

    /// Record a transport outcome on its entry.
    fn settle(&self, shared: &SharedEntry, result: Result<TransportResponse>) -> Result<()> {
        let url = shared.read().url().to_string();
        let fault = match result {
            Ok(response) => match response.fault() {
                None => {
                    self.store.complete(shared, response.body)?;
                    if shared.read().aggregators().is_empty() {
                        self.apply_handler(shared);
                    }
                    return Ok(());
                }
                Some(fault) => fault,
            },
            Err(err) => HyperlogError::TransportFailure {
                url: url.clone(),
                message: format!("{:#}", err),
            }
            .to_string(),
        };
        warn!(url = %url, fault = %fault, "Request faulted");
        self.metrics.record_fault();
        self.store.fail(shared, fault)?;
        Ok(())
    }

    /// Hand an aggregator-less response to the handler and keep its projection.
    fn apply_handler(&self, shared: &SharedEntry) {
        let snapshot = shared.read().clone();
        if snapshot.payload().is_some() {
            return;
        }
        if let Some(projection) = self.handler.handle(&snapshot) {
            shared.write().set_payload(projection);
        }
    }

    fn drain_children(shared: &SharedEntry, worklist: &mut VecDeque<Job>) {
        let aggregators = shared.read().aggregators().to_vec();
        for aggregator in &aggregators {
            Self::queue_children(aggregator, worklist);
        }
    }

    fn queue_children(aggregator: &Arc<dyn Aggregator>, worklist: &mut VecDeque<Job>) {
        for key in aggregator.take_pending() {
            worklist.push_back(Job {
                key,
                method: Method::Get,
                body: None,
                aggregator: Some(aggregator.clone()),
            });
        }
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("transport", &self.transport.name())
            .field("base_url", &self.base_url)
            .field("store", &self.store)
            .finish()
    }
}
