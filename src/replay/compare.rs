//! Expected/actual comparison of recorded entries.
//!
//! Bodies are compared after removing each side's own base url, so a replay
//! against another host only reports real differences. Markup bodies are
//! re-indented first; JSON bodies that parse on both sides compare as values,
//! which ignores formatting and key order.

use std::fmt;

use hyperlog_transport::network::{base_url, strip_base, strip_base_from_text};
use hyperlog_types::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::markup::pretty_print;
use crate::entry::{EventState, LogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonStatus {
    /// Present in the actual run only.
    Added,
    /// Present in the expected run only.
    Missing,
    Diff,
    Match,
}

impl fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComparisonStatus::Added => "ADDED",
            ComparisonStatus::Missing => "MISSING",
            ComparisonStatus::Diff => "DIFF",
            ComparisonStatus::Match => "MATCH",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct LogEntryComparison {
    pub status: ComparisonStatus,
    pub method: Method,
    /// Url with its base removed.
    pub path: String,
    pub expected: Option<LogEntry>,
    pub actual: Option<LogEntry>,
    /// First differing line, for `DIFF`.
    pub detail: Option<String>,
}

/// Body as compared: base stripped, markup re-indented.
fn normalized_body(entry: &LogEntry) -> String {
    let body = strip_base_from_text(entry.peek_response(), base_url(entry.url()));
    let markup = entry
        .key()
        .map(|key| key.sub_type.is_markup())
        .unwrap_or(false);
    if markup {
        pretty_print(&body)
    } else {
        body.trim().to_string()
    }
}

fn same_content(left: &str, right: &str) -> bool {
    if left == right {
        return true;
    }
    match (
        serde_json::from_str::<Value>(left),
        serde_json::from_str::<Value>(right),
    ) {
        (Ok(l), Ok(r)) => l == r,
        _ => false,
    }
}

fn first_difference(expected: &str, actual: &str) -> String {
    let mut expected_lines = expected.lines();
    let mut actual_lines = actual.lines();
    let mut line = 1;
    loop {
        match (expected_lines.next(), actual_lines.next()) {
            (Some(e), Some(a)) if e == a => line += 1,
            (e, a) => {
                return format!(
                    "line {}: expected {:?}, actual {:?}",
                    line,
                    e.unwrap_or(""),
                    a.unwrap_or("")
                )
            }
        }
    }
}

/// Classify one expected/actual pair. At least one side must be present.
pub fn compare(expected: Option<&LogEntry>, actual: Option<&LogEntry>) -> LogEntryComparison {
    let (status, detail) = match (expected, actual) {
        (Some(_), None) => (ComparisonStatus::Missing, None),
        (None, _) => (ComparisonStatus::Added, None),
        (Some(expected), Some(actual)) => {
            if expected.classification() != actual.classification() {
                (
                    ComparisonStatus::Diff,
                    Some(format!(
                        "state: expected {:?}, actual {:?}",
                        expected.classification(),
                        actual.classification()
                    )),
                )
            } else {
                let left = normalized_body(expected);
                let right = normalized_body(actual);
                if same_content(&left, &right) {
                    (ComparisonStatus::Match, None)
                } else {
                    (ComparisonStatus::Diff, Some(first_difference(&left, &right)))
                }
            }
        }
    };

    let reference = expected.or(actual);
    let expected = expected.cloned().map(|mut entry| {
        if status == ComparisonStatus::Missing {
            entry.mark_missing();
        }
        entry
    });
    LogEntryComparison {
        status,
        method: reference.map(LogEntry::method).unwrap_or(Method::Get),
        path: reference
            .map(|entry| strip_base(entry.url()).to_string())
            .unwrap_or_default(),
        expected,
        actual: actual.cloned(),
        detail,
    }
}

fn pairing_key(entry: &LogEntry) -> (Method, &str) {
    (entry.method(), strip_base(entry.url()))
}

/// Pair request entries by method and base-free url, in log order. Views are
/// ignored; unpaired entries become `MISSING` or `ADDED`.
pub fn compare_runs(expected: &[LogEntry], actual: &[LogEntry]) -> Vec<LogEntryComparison> {
    let requests = |entries: &[LogEntry]| -> Vec<usize> {
        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.is_view() && entry.state() != EventState::View)
            .map(|(index, _)| index)
            .collect()
    };
    let mut unused: Vec<usize> = requests(actual);
    let mut comparisons = Vec::new();

    for index in requests(expected) {
        let wanted = &expected[index];
        let paired = unused
            .iter()
            .position(|&candidate| pairing_key(&actual[candidate]) == pairing_key(wanted));
        let counterpart = paired.map(|slot| &actual[unused.remove(slot)]);
        comparisons.push(compare(Some(wanted), counterpart));
    }
    for index in unused {
        comparisons.push(compare(None, Some(&actual[index])));
    }
    comparisons
}

/// Counts over a set of comparisons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub matched: usize,
    pub diffs: usize,
    pub missing: usize,
    pub added: usize,
}

impl ReplayReport {
    pub fn from_comparisons(comparisons: &[LogEntryComparison]) -> Self {
        let mut report = Self::default();
        for comparison in comparisons {
            match comparison.status {
                ComparisonStatus::Match => report.matched += 1,
                ComparisonStatus::Diff => report.diffs += 1,
                ComparisonStatus::Missing => report.missing += 1,
                ComparisonStatus::Added => report.added += 1,
            }
        }
        report
    }

    pub fn total(&self) -> usize {
        self.matched + self.diffs + self.missing + self.added
    }

    /// No regressions: everything matched.
    pub fn is_clean(&self) -> bool {
        self.diffs == 0 && self.missing == 0 && self.added == 0
    }

    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("Replay Report".to_string());
        lines.push("=".repeat(40));
        lines.push(format!("  Compared: {}", self.total()));
        lines.push(format!("  MATCH:    {}", self.matched));
        lines.push(format!("  DIFF:     {}", self.diffs));
        lines.push(format!("  MISSING:  {}", self.missing));
        lines.push(format!("  ADDED:    {}", self.added));
        lines.join("\n")
    }
}
