//! Custom assertion utilities for tests.

use std::time::Duration;

/// Assert that a result is Ok and return the inner value.
///
/// Provides a better error message than `.unwrap()` by including context.
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("{} failed: {:?}", context, e),
    }
}

/// Assert that `elapsed` is no shorter than `min`.
pub fn assert_at_least(elapsed: Duration, min: Duration, context: &str) {
    assert!(
        elapsed >= min,
        "{}: expected at least {:?}, got {:?}",
        context,
        min,
        elapsed
    );
}
