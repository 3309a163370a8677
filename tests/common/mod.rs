#![allow(unused_imports)]
#![allow(dead_code)]
//! Shared test utilities for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: representative response bodies (objects, layouts, lists)
//! - `mocks`: scripted server setup and a recording status observer
//! - `assertions`: assertion helpers with descriptive failure messages

pub mod assertions;
pub mod fixtures;
pub mod mocks;

pub use assertions::{assert_at_least, assert_ok};
pub use mocks::{harness, object_server, Harness, RecordingObserver};
