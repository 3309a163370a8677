//! hyperlog: request cache, event log and replay engine for hypermedia REST clients
//!
//! The core a hypermedia client needs between its views and the wire:
//!
//! - **Event log**: every request/response and UI view as a stateful [`LogEntry`]
//!   in an append-ordered [`EventStore`]
//! - **Fuzzy cache**: lookups that tolerate opaque per-request identifiers in
//!   volatile urls (see [`ResourceKey::equivalent_to`])
//! - **Fan-in**: [`Aggregator`]s that assemble object and list views from
//!   resources arriving in any order
//! - **Replay**: capture a session, re-issue it with its original pacing against
//!   another server, and diff the results (see [`replay`])
//!
//! Requests go through [`RequestDispatcher::fetch`]; the network sits behind
//! [`hyperlog_transport::Transport`].

#![allow(clippy::type_complexity)]

pub mod aggregator;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod handler;
pub mod links;
pub mod metrics;
pub mod replay;
pub mod store;

pub use aggregator::{
    AggregateStatus, Aggregator, CompletionListener, FanInAggregator, ListAggregator,
    ListAssembly, ListRole, ObjectAggregator, ObjectAssembly, ObjectRole, Part,
    SingleAggregator, SingleAssembly,
};
pub use dispatcher::RequestDispatcher;
pub use entry::{EventState, LogEntry, Outcome, SharedEntry};
pub use error::HyperlogError;
pub use handler::{JsonProjectionHandler, Projection, ResponseHandler};
pub use links::{JsonLinkResolver, LinkResolver};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use replay::{ComparisonStatus, LogEntryComparison, ReplayEngine, ReplayEvent, ReplayReport};
pub use store::{EventStore, Lookup, StatusObserver};

pub use hyperlog_transport::Transport;
pub use hyperlog_types::{HyperlogConfig, Method, ResourceKey, SubType};
