//! Typed, TTL-aware client state persistence with reactive stores.
//!
//! - [`storage`] - envelopes, key namespacing, backends and the expiring cache
//! - [`reactive`] - cells and stores that mirror state into storage
//! - [`config`] - `crux.toml` loading and validation
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod config;
pub mod constants;
pub mod error;
pub mod reactive;
pub mod storage;

pub use error::{Error, Result};
