//! Fan-in aggregation of dependent resources.
//!
//! A view usually needs several resources before it can render: an object,
//! its layout and every collection the layout references, or a list plus the
//! metadata of its first member. An [`Aggregator`] is attached to every entry
//! it depends on and is updated as each one resolves, in any order.
//!
//! Aggregators never issue requests themselves. Children discovered while
//! processing an update are queued and handed to the dispatcher through
//! [`Aggregator::take_pending`], which keeps all network work in one place and
//! all store locks out of aggregator code.
//!
//! # Status
//!
//! ```text
//! Idle ──expect──▶ Pending ──all arrived──▶ Ready (latched)
//!                     ├──root failed────▶ Failed
//!                     └──child failed───▶ Partial
//! any ──reset──▶ Idle (late updates discarded)
//! ```

mod assembly;
mod fan_in;

pub use assembly::{
    Assembly, ListAggregator, ListAssembly, ListRole, ObjectAggregator, ObjectAssembly,
    ObjectRole, SingleAggregator, SingleAssembly, SingleRole,
};
pub use fan_in::{Child, ChildState, FanIn, Settled};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hyperlog_types::ResourceKey;
use parking_lot::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::entry::LogEntry;
use crate::links::LinkResolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateStatus {
    /// No root expected yet, or reset.
    Idle,
    Pending,
    Ready,
    /// Every child settled but some failed.
    Partial { failed: Vec<String> },
    /// The root itself failed.
    Failed { reason: String },
}

impl AggregateStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AggregateStatus::Ready | AggregateStatus::Partial { .. } | AggregateStatus::Failed { .. }
        )
    }
}

/// Consumer of resolved entries that assembles a composite view.
pub trait Aggregator: Send + Sync {
    fn name(&self) -> &str;

    /// Declare a resource the caller is about to fetch on this aggregator's
    /// behalf. The first expectation becomes the root. Reopens a reset
    /// aggregator.
    fn expect(&self, key: &ResourceKey);

    /// Deliver a resolved entry. Idempotent per child; updates after
    /// [`reset`](Self::reset) are discarded.
    fn update(&self, entry: &LogEntry);

    /// Children discovered since the last call, each handed out once.
    fn take_pending(&self) -> Vec<ResourceKey>;

    fn status(&self) -> AggregateStatus;

    /// Monotone: once true it stays true until reset.
    fn is_ready(&self) -> bool {
        self.status() == AggregateStatus::Ready
    }

    fn reset(&self);

    /// True between [`reset`](Self::reset) and the next
    /// [`expect`](Self::expect); entries drop closed aggregators.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Callback fired once when an aggregator reaches a terminal status.
pub type CompletionListener = Arc<dyn Fn(&str, &AggregateStatus) + Send + Sync>;

/// One assembled part of a composite view.
#[derive(Debug, Clone, PartialEq)]
pub struct Part<R> {
    pub role: R,
    pub url: String,
    pub body: String,
}

/// [`Aggregator`] driven by a [`FanIn`] tracker and an [`Assembly`] that
/// decides which children each arrival requires.
pub struct FanInAggregator<A: Assembly> {
    id: Uuid,
    name: String,
    assembly: A,
    resolver: Arc<dyn LinkResolver>,
    state: Mutex<FanIn<A::Role>>,
    listener: Option<CompletionListener>,
    discarded: AtomicU64,
}

impl<A: Assembly> FanInAggregator<A> {
    pub fn new(assembly: A, resolver: Arc<dyn LinkResolver>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            name: format!("{}-{}", A::KIND, &id.simple().to_string()[..8]),
            assembly,
            resolver,
            state: Mutex::new(FanIn::new()),
            listener: None,
            discarded: AtomicU64::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_listener(mut self, listener: CompletionListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Updates dropped because the aggregator was reset.
    pub fn discarded_updates(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Bodies of every child that has arrived so far, root first.
    pub fn parts(&self) -> Vec<Part<A::Role>> {
        self.state
            .lock()
            .children()
            .iter()
            .filter_map(|child| {
                child.body.as_ref().map(|body| Part {
                    role: child.role,
                    url: child.key.url.clone(),
                    body: body.clone(),
                })
            })
            .collect()
    }

    pub fn part(&self, role: A::Role) -> Option<Part<A::Role>> {
        self.parts().into_iter().find(|part| part.role == role)
    }
}

impl<A: Assembly> Aggregator for FanInAggregator<A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn expect(&self, key: &ResourceKey) {
        let mut state = self.state.lock();
        // A reset tracker has no children, so the next expectation is a root.
        let role = if state.has_root() {
            A::extra_role()
        } else {
            A::root_role()
        };
        if state.expect(key, role) {
            debug!(aggregator = %self.name, url = %key.url, role = ?role, "Expecting resource");
        }
    }

    fn update(&self, entry: &LogEntry) {
        let report = {
            let mut state = self.state.lock();
            if state.is_closed() {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                trace!(aggregator = %self.name, url = entry.url(), "Discarding update after reset");
                return;
            }
            let Some(settled) = state.settle(entry) else {
                trace!(aggregator = %self.name, url = entry.url(), "Update not for a pending child");
                return;
            };
            if settled.first_arrival {
                let discovered = self.assembly.discover(
                    settled.role,
                    &settled.url,
                    entry.peek_response(),
                    self.resolver.as_ref(),
                );
                for (key, role) in discovered {
                    if state.require(key.clone(), role) {
                        trace!(aggregator = %self.name, url = %key.url, role = ?role, "Discovered child");
                    }
                }
            }
            state.refresh();
            if state.take_terminal_report() {
                Some(state.status())
            } else {
                None
            }
        };

        if let Some(status) = report {
            debug!(aggregator = %self.name, status = ?status, "Aggregate settled");
            if let Some(listener) = &self.listener {
                listener(&self.name, &status);
            }
        }
    }

    fn take_pending(&self) -> Vec<ResourceKey> {
        self.state.lock().take_pending()
    }

    fn status(&self) -> AggregateStatus {
        self.state.lock().status()
    }

    fn reset(&self) {
        self.state.lock().reset();
        debug!(aggregator = %self.name, "Aggregator reset");
    }

    fn is_closed(&self) -> bool {
        self.state.lock().is_closed()
    }
}

impl<A: Assembly> fmt::Debug for FanInAggregator<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanInAggregator")
            .field("name", &self.name)
            .field("kind", &A::KIND)
            .field("status", &self.status())
            .finish()
    }
}
