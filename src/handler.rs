//! Response-handler collaborator and typed projections.
//!
//! When a request has no aggregator, its response goes to a
//! [`ResponseHandler`], which may build a [`Projection`]: a flat, typed map of
//! the fields tabular views display, built once per payload and attached to
//! the entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::LogEntry;

/// Flat view of a parsed payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// Domain type of the represented object, when the payload names one.
    pub kind: Option<String>,
    fields: BTreeMap<String, String>,
}

impl Projection {
    pub fn new(kind: Option<String>) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// First writer wins: top-level fields shadow member values of the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_insert_with(|| value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Decides how a resolved entry without aggregator is parsed.
pub trait ResponseHandler: Send + Sync {
    /// `None` leaves the entry without payload (unparsable or uninteresting).
    fn handle(&self, entry: &LogEntry) -> Option<Projection>;
}

/// Handler that ignores every response.
#[derive(Debug, Default)]
pub struct NoopHandler;

impl ResponseHandler for NoopHandler {
    fn handle(&self, _entry: &LogEntry) -> Option<Projection> {
        None
    }
}

/// Projects JSON object representations: top-level scalars plus the scalar
/// `value` of every entry in `members`.
#[derive(Debug, Default)]
pub struct JsonProjectionHandler;

impl JsonProjectionHandler {
    fn scalar(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn project(body: &str) -> Option<Projection> {
        let root: Value = serde_json::from_str(body).ok()?;
        let object = root.as_object()?;

        let kind = object
            .get("domainType")
            .or_else(|| object.get("extensions").and_then(|e| e.get("domainType")))
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut projection = Projection::new(kind);

        for (name, value) in object {
            if let Some(text) = Self::scalar(value) {
                projection.insert(name.as_str(), text);
            }
        }
        if let Some(members) = object.get("members").and_then(Value::as_object) {
            for (name, member) in members {
                if let Some(text) = member.get("value").and_then(Self::scalar) {
                    projection.insert(name.as_str(), text);
                }
            }
        }
        Some(projection)
    }
}

impl ResponseHandler for JsonProjectionHandler {
    fn handle(&self, entry: &LogEntry) -> Option<Projection> {
        if !entry.has_response() {
            return None;
        }
        Self::project(entry.peek_response())
    }
}
