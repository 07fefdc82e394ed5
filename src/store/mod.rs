//! Namespaced key-value storage with pluggable backends.
//!
//! Every backend implements the [`Store`] contract:
//!
//! - **MemoryStore**: Fast, non-persistent storage (reference implementation)
//! - **FileStore**: Persistent storage with ACID guarantees, one redb file per
//!   namespace
//! - **CacheStore**: Read-through / write-through decorator combining a fast
//!   front with an authoritative back
//!
//! # Example
//!
//! ```ignore
//! use stowage::store::{KvStore, default_dir};
//!
//! // In-memory (testing/embedding)
//! let store = KvStore::memory();
//! store.set("key", b"value", None).await?;
//!
//! // Persistent, with an in-memory cache in front
//! let store = KvStore::file(default_dir()).cached();
//! store.set("key", b"value", None).await?;
//! ```
//!
//! # Custom Backends
//!
//! Implement the `Store` trait to plug in other storage:
//!
//! ```ignore
//! use stowage::store::{KvStore, Store};
//!
//! struct PostgresStore { /* ... */ }
//! impl Store for PostgresStore { /* ... */ }
//!
//! let store = KvStore::custom(PostgresStore::new());
//! ```

mod backend;
mod cache;
mod error;
mod kv;
mod memory;
mod query;
mod redb;
mod types;

#[cfg(test)]
mod testing;

// Re-export the public API
pub use backend::Store;
pub use cache::CacheStore;
pub use error::{Error, Result};
pub use kv::KvStore;
pub use memory::MemoryStore;
pub use redb::{FileStore, default_dir};
pub use types::{DeleteOptions, ListOptions, Namespace, Options, ReadOptions, Record, WriteOptions};
