//! Typed environment variable helpers.
//!
//! Settings that can come from the environment are parsed through these
//! helpers so an unset or malformed variable quietly falls back to a default.
//!
//! ```
//! use hyperlog_types::env::{env_bool, env_var_or};
//!
//! let timeout: u64 = env_var_or("HYPERLOG_DOC_TIMEOUT_SECS", 30);
//! assert_eq!(timeout, 30);
//! assert!(!env_bool("HYPERLOG_DOC_FLAG"));
//! ```

use std::str::FromStr;

/// Parse a variable; `None` when unset or unparsable.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a variable, falling back to `default`.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

/// Non-empty string value of a variable.
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// String value with a default for unset or blank variables.
pub fn env_string_or(key: &str, default: &str) -> String {
    env_string(key).unwrap_or_else(|| default.to_string())
}

/// "1", "true", "yes" and "on" (any case) are truthy; everything else is not.
pub fn env_bool(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
