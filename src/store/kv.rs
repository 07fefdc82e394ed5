//! High-level `KvStore` handle over any [`Store`] implementation.
//!
//! Picks the backend at construction and provides a small convenience API
//! on top of the full contract.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::backend::Store;
use super::cache::CacheStore;
use super::error::{Error, Result};
use super::memory::MemoryStore;
use super::redb::FileStore;
use super::types::{DeleteOptions, ListOptions, Options, ReadOptions, Record, WriteOptions};
use crate::config::{BackendKind, StoreConfig};
use crate::metrics;

/// Shared handle to a store.
///
/// Wraps an `Arc<dyn Store>` so the same API works regardless of the
/// underlying backend. Every call runs under the handle's shutdown token;
/// [`shutdown`](KvStore::shutdown) cancels whatever is still in flight.
///
/// # Thread Safety
///
/// `KvStore` is `Clone` and can be shared across threads. Clones share the
/// store and the shutdown token.
///
/// # Example
///
/// ```ignore
/// use stowage::store::KvStore;
/// use std::time::Duration;
///
/// let store = KvStore::memory();
/// store.set("session:123", b"user_data", Some(Duration::from_secs(3600))).await?;
///
/// if let Some(record) = store.get("session:123").await? {
///     println!("Found: {} bytes", record.value.len());
/// }
/// ```
#[derive(Clone)]
pub struct KvStore {
    store: Arc<dyn Store>,
    shutdown: CancellationToken,
}

impl KvStore {
    /// Creates a handle over a new in-memory store.
    pub fn memory() -> Self {
        Self::custom(MemoryStore::new())
    }

    /// Creates a handle over a redb file store rooted at `dir`.
    pub fn file<P: AsRef<Path>>(dir: P) -> Self {
        Self::custom(FileStore::new(dir))
    }

    /// Creates a handle over a custom backend.
    pub fn custom<S: Store>(store: S) -> Self {
        Self::from_arc(Arc::new(store))
    }

    /// Creates a handle over an already shared store.
    pub fn from_arc(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            shutdown: CancellationToken::new(),
        }
    }

    /// Puts a [`CacheStore`] in front of this handle's store.
    #[must_use]
    pub fn cached(self) -> Self {
        Self {
            store: Arc::new(CacheStore::new(self.store)),
            shutdown: self.shutdown,
        }
    }

    /// Builds and initializes the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured namespace cannot be initialized
    /// (for the file backend: the directory or database cannot be created).
    pub async fn from_config(config: &StoreConfig) -> anyhow::Result<Self> {
        let options = config.options();
        let base: Arc<dyn Store> = match config.backend {
            BackendKind::Memory => Arc::new(config.memory_store()),
            BackendKind::File => Arc::new(FileStore::with_options(
                config.directory(),
                options.clone(),
            )),
        };

        let store: Arc<dyn Store> = if config.cache {
            let front: Arc<dyn Store> = Arc::new(config.memory_store());
            Arc::new(CacheStore::with_front(front, base))
        } else {
            base
        };

        let kv = Self::from_arc(store);
        kv.initialize(options.clone())
            .await
            .with_context(|| format!("Failed to initialize {} store", kv.name()))?;

        info!(store = kv.name(), namespace = %options.namespace(), "Store ready");
        Ok(kv)
    }

    /// The wrapped store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Name of the wrapped store.
    pub fn name(&self) -> &'static str {
        self.store.name()
    }

    /// Currently bound namespace.
    pub fn options(&self) -> Options {
        self.store.options()
    }

    /// Rebinds the store to `options`' namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot bind to the namespace.
    pub async fn initialize(&self, options: Options) -> Result<()> {
        metrics::record_operation(self.name(), "initialize");
        self.store.initialize(&self.shutdown, options).await
    }

    /// Reads records matching `key` under `opts`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an exact-key miss, or the backend's
    /// error.
    pub async fn read(&self, key: &str, opts: ReadOptions) -> Result<Vec<Record>> {
        metrics::record_operation(self.name(), "read");
        self.store.read(&self.shutdown, key, opts).await
    }

    /// Writes `record` under `opts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn write(&self, record: Record, opts: WriteOptions) -> Result<()> {
        metrics::record_operation(self.name(), "write");
        self.store.write(&self.shutdown, record, opts).await
    }

    /// Lists keys under `opts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn list(&self, opts: ListOptions) -> Result<Vec<String>> {
        metrics::record_operation(self.name(), "list");
        self.store.list(&self.shutdown, opts).await
    }

    /// Retrieves the live record stored at `key`.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or has expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn get(&self, key: &str) -> Result<Option<Record>> {
        match self.read(key, ReadOptions::default()).await {
            Ok(mut records) => Ok(records.pop()),
            Err(Error::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Stores `value` at `key` with an optional TTL.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let record = Record::new(key, value).with_expiry(ttl.unwrap_or_default());
        self.write(record, WriteOptions::default()).await
    }

    /// Deletes `key`. Succeeds if it was already absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn delete(&self, key: &str) -> Result<()> {
        metrics::record_operation(self.name(), "delete");
        self.store
            .delete(&self.shutdown, key, DeleteOptions::default())
            .await
    }

    /// Lists all keys, optionally only those starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let opts = match prefix {
            Some(prefix) => ListOptions::default().prefix(prefix),
            None => ListOptions::default(),
        };
        self.list(opts).await
    }

    /// Checks if `key` exists and has not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Releases backend resources. The handle is usable again after
    /// [`initialize`](KvStore::initialize).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to close.
    pub async fn close(&self) -> Result<()> {
        metrics::record_operation(self.name(), "close");
        self.store.close().await
    }

    /// Cancels in-flight operations on every clone and closes the store.
    ///
    /// Unlike [`close`](KvStore::close) this is terminal: later calls through
    /// any clone fail with [`Error::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to close.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        self.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_get_set() {
        let store = KvStore::memory();

        store.set("key1", b"value1", None).await.unwrap();
        let record = store.get("key1").await.unwrap().unwrap();
        assert_eq!(record.value, b"value1");
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = KvStore::memory();
        assert!(store.get("nonexistent").await.unwrap().is_none());
        assert!(!store.exists("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_keys_with_prefix() {
        let store = KvStore::memory();
        store.set("user:2", b"bob", None).await.unwrap();
        store.set("user:1", b"alice", None).await.unwrap();
        store.set("session:abc", b"xyz", None).await.unwrap();

        assert_eq!(
            store.list_keys(Some("user:")).await.unwrap(),
            vec!["user:1", "user:2"]
        );
        assert_eq!(store.list_keys(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_ttl() {
        let store = KvStore::memory();
        store
            .set("key", b"value1", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        store
            .set("key", b"value2", Some(Duration::from_secs(3600)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        let record = store.get("key").await.unwrap().unwrap();
        assert_eq!(record.value, b"value2");
    }

    #[tokio::test]
    async fn test_cached_file_store() {
        let tmp = TempDir::new().unwrap();
        let store = KvStore::file(tmp.path()).cached();
        assert_eq!(store.name(), "cache");

        store.set("key", b"value", None).await.unwrap();
        store.delete("key").await.unwrap();
        assert!(!store.exists("key").await.unwrap());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_clones() {
        let store = KvStore::memory();
        let clone = store.clone();

        store.shutdown().await.unwrap();

        let err = clone.set("key", b"value", None).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_close_then_initialize() {
        let store = KvStore::memory();
        store.set("key", b"value", None).await.unwrap();

        store.close().await.unwrap();
        store
            .initialize(Options::default().table("other"))
            .await
            .unwrap();

        assert_eq!(store.options().table, "other");
        store.set("key", b"again", None).await.unwrap();
        assert!(store.exists("key").await.unwrap());
    }
}
