//! Shared types for the hyperlog workspace.
//!
//! This crate holds the pieces every other crate agrees on:
//!
//! - [`ResourceKey`](key::ResourceKey) - identity of a remote resource request and
//!   the fuzzy equivalence rule used for cache lookups
//! - [`Method`](key::Method) / [`SubType`](key::SubType) - request verb and response variant
//! - [`HyperlogConfig`](config::HyperlogConfig) - connection and replay settings
//! - [`env`] - typed environment variable helpers

pub mod config;
pub mod env;
pub mod key;

pub use config::HyperlogConfig;
pub use key::{Method, ResourceKey, SubType};
