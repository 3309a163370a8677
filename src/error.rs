//! Error taxonomy of the request core.
//!
//! Contract violations (`NotFoundForUpdate`, `AlreadyResolved`) are returned,
//! never swallowed. Late updates to a reset aggregator and replay orphans are
//! not errors at all: the former are discarded by the aggregator, the latter
//! surface as `ADDED`/`MISSING` comparisons.

use std::fmt;

use crate::entry::EventState;

#[derive(Debug, Clone, PartialEq)]
pub enum HyperlogError {
    /// A live call failed or timed out.
    TransportFailure { url: String, message: String },
    /// `end`/`fault` for a key without a matching `RUNNING` entry.
    NotFoundForUpdate { url: String },
    /// Attempt to resolve an entry a second time.
    AlreadyResolved { title: String, state: EventState },
    /// `close_view` for a title that was never opened.
    UnknownView { title: String },
    /// Imported replay data that violates the event invariants.
    InvalidEvent { index: usize, reason: String },
}

impl fmt::Display for HyperlogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HyperlogError::TransportFailure { url, message } => {
                write!(f, "TransportFailure: {}: {}", url, message)
            }
            HyperlogError::NotFoundForUpdate { url } => {
                write!(f, "NotFoundForUpdate: no running entry for {}", url)
            }
            HyperlogError::AlreadyResolved { title, state } => {
                write!(f, "AlreadyResolved: {} is already {:?}", title, state)
            }
            HyperlogError::UnknownView { title } => {
                write!(f, "UnknownView: no view titled '{}'", title)
            }
            HyperlogError::InvalidEvent { index, reason } => {
                write!(f, "InvalidEvent: event #{}: {}", index, reason)
            }
        }
    }
}

impl std::error::Error for HyperlogError {}
