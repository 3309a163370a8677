//! Book-keeping for one fan-in task.
//!
//! A [`FanIn`] owns the set of required children (each tagged with the role it
//! plays in the composite view) and a worklist of children discovered but not
//! yet dispatched. Completion is the simple predicate "every required child
//! arrived"; discovery happens synchronously inside [`FanIn::settle`]'s caller,
//! so the predicate can never fire between a parent arriving and its own
//! children being registered.

use std::collections::VecDeque;

use hyperlog_transport::network::strip_base;
use hyperlog_types::ResourceKey;

use super::AggregateStatus;
use crate::entry::{EventState, LogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Pending,
    Arrived,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Child<R> {
    pub key: ResourceKey,
    pub role: R,
    pub state: ChildState,
    pub body: Option<String>,
}

/// Result of routing an entry to a required child.
#[derive(Debug, Clone)]
pub struct Settled<R> {
    pub role: R,
    /// Url the child was registered under (not necessarily the entry's url).
    pub url: String,
    /// True only the first time the child arrives successfully.
    pub first_arrival: bool,
}

#[derive(Debug)]
pub struct FanIn<R> {
    children: Vec<Child<R>>,
    worklist: VecDeque<ResourceKey>,
    ready: bool,
    closed: bool,
    reported: Option<AggregateStatus>,
}

impl<R> Default for FanIn<R> {
    fn default() -> Self {
        Self {
            children: Vec::new(),
            worklist: VecDeque::new(),
            ready: false,
            closed: false,
            reported: None,
        }
    }
}

impl<R: Copy + PartialEq> FanIn<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_root(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Exact match first, then the same path on another base, then the first
    /// equivalent volatile child.
    fn locate(&self, key: &ResourceKey) -> Option<usize> {
        let path = strip_base(&key.url);
        self.children
            .iter()
            .position(|child| &child.key == key)
            .or_else(|| {
                self.children.iter().position(|child| {
                    child.key.sub_type == key.sub_type && strip_base(&child.key.url) == path
                })
            })
            .or_else(|| {
                self.children
                    .iter()
                    .position(|child| child.key.is_volatile() && child.key.equivalent_to(key))
            })
    }

    /// Register a child the caller is about to dispatch itself.
    ///
    /// Reopens a reset tracker. Returns `false` when the key was already known
    /// or the task is complete.
    pub fn expect(&mut self, key: &ResourceKey, role: R) -> bool {
        self.closed = false;
        if self.ready || self.locate(key).is_some() {
            return false;
        }
        self.children.push(Child {
            key: key.clone(),
            role,
            state: ChildState::Pending,
            body: None,
        });
        true
    }

    /// Register a discovered child and queue it for dispatch.
    pub fn require(&mut self, key: ResourceKey, role: R) -> bool {
        if self.closed || !self.expect(&key, role) {
            return false;
        }
        self.worklist.push_back(key);
        true
    }

    /// Route a resolved entry to its child. `None` means the update is not for
    /// this task (closed, unknown key, still running, or a repeat delivery).
    pub fn settle(&mut self, entry: &LogEntry) -> Option<Settled<R>> {
        if self.closed {
            return None;
        }
        let key = entry.key()?;
        let index = self.locate(key)?;
        let child = &mut self.children[index];

        // A child only arrives with a non-empty body.
        let succeeded = match entry.classification() {
            Some(EventState::Success) => !entry.peek_response().is_empty(),
            Some(_) => false,
            None => return None,
        };

        if child.state == ChildState::Arrived {
            return None;
        }
        if succeeded {
            child.state = ChildState::Arrived;
            child.body = Some(entry.peek_response().to_string());
        } else {
            child.state = ChildState::Failed;
        }
        let settled = Settled {
            role: child.role,
            url: child.key.url.clone(),
            first_arrival: succeeded,
        };
        Some(settled)
    }

    /// Latch readiness once every required child has arrived.
    pub fn refresh(&mut self) {
        if !self.ready
            && self.has_root()
            && self.worklist.is_empty()
            && self
                .children
                .iter()
                .all(|child| child.state == ChildState::Arrived)
        {
            self.ready = true;
        }
    }

    /// Drain the worklist. Each key is handed out exactly once.
    pub fn take_pending(&mut self) -> Vec<ResourceKey> {
        self.worklist.drain(..).collect()
    }

    pub fn status(&self) -> AggregateStatus {
        if self.ready {
            return AggregateStatus::Ready;
        }
        if self.closed || !self.has_root() {
            return AggregateStatus::Idle;
        }
        if let Some(root) = self.children.first() {
            if root.state == ChildState::Failed {
                return AggregateStatus::Failed {
                    reason: format!("{} failed", root.key.url),
                };
            }
        }
        let unsettled = !self.worklist.is_empty()
            || self
                .children
                .iter()
                .any(|child| child.state == ChildState::Pending);
        if unsettled {
            return AggregateStatus::Pending;
        }
        AggregateStatus::Partial {
            failed: self
                .children
                .iter()
                .filter(|child| child.state == ChildState::Failed)
                .map(|child| child.key.url.clone())
                .collect(),
        }
    }

    /// True once per distinct terminal status (Ready, Partial or Failed), so
    /// a retry that turns a failed view ready is reported again.
    pub fn take_terminal_report(&mut self) -> bool {
        let status = self.status();
        if !status.is_terminal() || self.reported.as_ref() == Some(&status) {
            return false;
        }
        self.reported = Some(status);
        true
    }

    pub fn children(&self) -> &[Child<R>] {
        &self.children
    }

    /// Forget all partial state; late updates are discarded until the next
    /// [`expect`](Self::expect).
    pub fn reset(&mut self) {
        self.children.clear();
        self.worklist.clear();
        self.ready = false;
        self.reported = None;
        self.closed = true;
    }
}
