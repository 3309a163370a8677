//! Resource identity and fuzzy equivalence.
//!
//! A [`ResourceKey`] names one remote resource request: the url, the response
//! variant that was asked for, and (optionally) the url of the resource the
//! link was followed from.
//!
//! Two notions of "same resource" exist:
//!
//! - **exact**: url and sub-type match verbatim (`==`, `Hash`)
//! - **equivalent**: sub-types match, both urls have the same number of `/`
//!   segments, and the weighted count of differing segments is at most
//!   [`ALLOWED_DIFF`]
//!
//! Servers embed opaque, serialized object identifiers in paths, and the same
//! logical object may come back under a different identifier after a mutation.
//! A differing segment pair where both sides look like such identifiers weighs
//! 1; any other differing pair (a named path segment) weighs 2 and therefore
//! always rejects the match.
//!
//! ```
//! use hyperlog_types::{ResourceKey, SubType};
//!
//! let a = ResourceKey::new("http://h/a/XXXX/b", SubType::Json);
//! let b = ResourceKey::new("http://h/a/YYYY/b", SubType::Json);
//! let c = ResourceKey::new("http://h/a/XXXX/c", SubType::Json);
//!
//! assert!(a.equivalent_to(&b));
//! assert!(!a.equivalent_to(&c));
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum weighted segment difference tolerated by [`ResourceKey::equivalent_to`].
///
/// Deliberately narrow: one opaque identifier may change, nothing else.
pub const ALLOWED_DIFF: usize = 1;

/// Url suffixes of resources that are re-derived per object instance.
const VOLATILE_SUFFIXES: &[&str] = &["/layout", "/object-layout"];

/// Path segment introducing per-property sub-resources.
const PROPERTY_SEGMENT: &str = "/properties/";

/// HTTP verb of a logged request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "PUT" => Ok(Method::Put),
            "POST" => Ok(Method::Post),
            "DELETE" => Ok(Method::Delete),
            other => Err(anyhow::anyhow!("unknown method: {}", other)),
        }
    }
}

/// Response content variant requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubType {
    /// Structured data (JSON representations).
    #[default]
    Json,
    /// Markup (XML documents such as layouts).
    Xml,
}

impl SubType {
    /// Value for the `Accept` header.
    pub fn accept_header(&self) -> &'static str {
        match self {
            SubType::Json => "application/json",
            SubType::Xml => "application/xml",
        }
    }

    pub fn is_markup(&self) -> bool {
        matches!(self, SubType::Xml)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubType::Json => "json",
            SubType::Xml => "xml",
        }
    }
}

impl fmt::Display for SubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "json" => Ok(SubType::Json),
            "xml" => Ok(SubType::Xml),
            other => Err(anyhow::anyhow!("unknown sub-type: {}", other)),
        }
    }
}

/// Canonical identity of a remote resource request.
///
/// Equality and hashing consider `url` and `sub_type` only; the referrer is
/// bookkeeping for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceKey {
    pub url: String,
    #[serde(default)]
    pub sub_type: SubType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer_url: Option<String>,
}

impl ResourceKey {
    pub fn new(url: impl Into<String>, sub_type: SubType) -> Self {
        Self {
            url: url.into(),
            sub_type,
            referrer_url: None,
        }
    }

    /// Shorthand for a JSON resource.
    pub fn json(url: impl Into<String>) -> Self {
        Self::new(url, SubType::Json)
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer_url = Some(referrer.into());
        self
    }

    /// Url without query string.
    fn path_part(&self) -> &str {
        self.url.split('?').next().unwrap_or(&self.url)
    }

    /// True for resource shapes that embed instance-specific identifiers
    /// (layouts and per-property sub-resources). Lookups for these keys use
    /// [`equivalent_to`](Self::equivalent_to) instead of exact equality.
    pub fn is_volatile(&self) -> bool {
        let path = self.path_part();
        VOLATILE_SUFFIXES.iter().any(|suffix| path.ends_with(suffix))
            || path.contains(PROPERTY_SEGMENT)
    }

    /// Fuzzy equivalence, see the module docs. Symmetric by construction.
    pub fn equivalent_to(&self, other: &ResourceKey) -> bool {
        if self.sub_type != other.sub_type {
            return false;
        }
        urls_equivalent(&self.url, &other.url)
    }
}

impl PartialEq for ResourceKey {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url && self.sub_type == other.sub_type
    }
}

impl Eq for ResourceKey {}

impl Hash for ResourceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
        self.sub_type.hash(state);
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.url, self.sub_type)
    }
}

/// Segment-diff comparison of two urls.
///
/// Segment counts must match before any difference is counted: a different
/// count means a different resource shape.
pub fn urls_equivalent(left: &str, right: &str) -> bool {
    let left: Vec<&str> = left.split('/').collect();
    let right: Vec<&str> = right.split('/').collect();
    if left.len() != right.len() {
        return false;
    }

    let mut diff = 0usize;
    for (l, r) in left.iter().zip(right.iter()) {
        if l == r {
            continue;
        }
        diff += segment_weight(l, r);
        if diff > ALLOWED_DIFF {
            return false;
        }
    }
    true
}

fn segment_weight(left: &str, right: &str) -> usize {
    if looks_like_identifier(left) && looks_like_identifier(right) {
        1
    } else {
        2
    }
}

/// Shortest all-upper-case token taken for an identifier.
const MIN_UPPER_ID_LEN: usize = 3;

/// Shortest mixed token (letters and digits) taken for an unpadded encoded id.
const MIN_ENCODED_ID_LEN: usize = 16;

/// Heuristic for opaque identifier segments.
///
/// A segment is an identifier when it is a plain integer, or a token in the
/// base64/url-escape alphabet that also has one of these markers:
///
/// - base64 padding (`=` at the end) or an escape/`+` character
/// - only upper-case letters and digits, at least [`MIN_UPPER_ID_LEN`] long
/// - letters and digits mixed, at least [`MIN_ENCODED_ID_LEN`] long
///
/// Short lower- or mixed-case names with a digit (`address1`, `line2`) are
/// named segments.
pub fn looks_like_identifier(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    if segment.parse::<i64>().is_ok() {
        return true;
    }
    let token_alphabet = segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '=' | '_' | '-' | '%'));
    if !token_alphabet {
        return false;
    }
    if segment.ends_with('=') || segment.contains(['+', '%']) {
        return true;
    }
    let upper_token = segment
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && segment.chars().any(|c| c.is_ascii_uppercase());
    if upper_token && segment.len() >= MIN_UPPER_ID_LEN {
        return true;
    }
    segment.len() >= MIN_ENCODED_ID_LEN
        && segment.chars().any(|c| c.is_ascii_digit())
        && segment.chars().any(|c| c.is_ascii_alphabetic())
}
