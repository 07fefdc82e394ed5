//! Pluggable key-value storage with TTL expiry and a caching decorator.
//!
//! - [`store`] - the [`Store`](store::Store) contract, its backends and the
//!   [`KvStore`](store::KvStore) handle
//! - [`config`] - TOML configuration for building a store
//! - [`telemetry`] - logging setup
//! - [`metrics`] - operation counters

pub mod config;
pub mod constants;
pub mod metrics;
pub mod store;
pub mod telemetry;

pub use config::{BackendKind, StoreConfig};
pub use store::{Error, KvStore, Record, Result, Store};
