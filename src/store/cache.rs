//! Read-through / write-through caching decorator.
//!
//! [`CacheStore`] puts a fast front store (a [`MemoryStore`] by default) in
//! front of an authoritative back store and exposes both as one [`Store`].
//!
//! The two delegates are never updated atomically. A write or delete goes to
//! the front first and then to the back; if the back fails the error is
//! returned but the front keeps the change. Callers must read any error from
//! `write` or `delete` as "the front may be ahead of the back", not merely as
//! "nothing happened".

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::Store;
use super::error::{Error, Result};
use super::memory::MemoryStore;
use super::types::{DeleteOptions, ListOptions, Options, ReadOptions, Record, WriteOptions};
use crate::metrics;

/// Store with an in-memory front layer over a backing store.
///
/// - `read` serves non-empty front results directly and otherwise reads the
///   back, copying every returned record into the front.
/// - `write` / `delete` apply to the front, then the back. A front failure
///   leaves the back untouched.
/// - `list` trusts a non-empty front listing; an empty one is filled from
///   the back. A partially warmed front can therefore list fewer keys than
///   the back holds.
///
/// The caller's cancellation token is passed unchanged to both delegates.
///
/// # Example
///
/// ```ignore
/// use stowage::store::{CacheStore, FileStore};
///
/// let store = CacheStore::new(Arc::new(FileStore::new("/var/lib/app/store")));
/// ```
pub struct CacheStore {
    front: Arc<dyn Store>,
    back: Arc<dyn Store>,
    options: RwLock<Options>,
}

impl CacheStore {
    /// Wraps `back` with a new, empty [`MemoryStore`] bound to the same
    /// namespace. The cache owns that front store.
    pub fn new(back: Arc<dyn Store>) -> Self {
        let options = back.options();
        let front: Arc<dyn Store> = Arc::new(MemoryStore::with_options(options.clone()));
        Self {
            front,
            back,
            options: RwLock::new(options),
        }
    }

    /// Composes explicit delegates. Both should be bound to the same
    /// namespace; [`initialize`](Store::initialize) rebinds them together.
    pub fn with_front(front: Arc<dyn Store>, back: Arc<dyn Store>) -> Self {
        let options = back.options();
        Self {
            front,
            back,
            options: RwLock::new(options),
        }
    }

    /// The fast front store.
    pub fn front(&self) -> &Arc<dyn Store> {
        &self.front
    }

    /// The authoritative back store.
    pub fn back(&self) -> &Arc<dyn Store> {
        &self.back
    }
}

#[async_trait]
impl Store for CacheStore {
    async fn initialize(&self, cancel: &CancellationToken, options: Options) -> Result<()> {
        self.back.initialize(cancel, options.clone()).await?;

        if let Err(e) = self.front.initialize(cancel, options.clone()).await {
            // Put the back on the previous namespace again. The caller's
            // token may be the reason the front failed, so use a fresh one.
            let previous = self.options();
            if let Err(rollback) = self
                .back
                .initialize(&CancellationToken::new(), previous.clone())
                .await
            {
                warn!(
                    store = "cache",
                    namespace = %previous.namespace(),
                    error = %rollback,
                    "Failed to restore back store namespace; delegates disagree"
                );
            }
            return Err(e);
        }

        *self.options.write() = options;
        Ok(())
    }

    fn options(&self) -> Options {
        self.options.read().clone()
    }

    async fn read(
        &self,
        cancel: &CancellationToken,
        key: &str,
        opts: ReadOptions,
    ) -> Result<Vec<Record>> {
        match self.front.read(cancel, key, opts.clone()).await {
            Ok(records) if !records.is_empty() => {
                metrics::record_cache_lookup("front", "hit");
                return Ok(records);
            },
            Ok(_) | Err(Error::NotFound) => metrics::record_cache_lookup("front", "miss"),
            Err(e) => return Err(e),
        }

        let populate = WriteOptions {
            ttl: None,
            database: opts.database.clone(),
            table: opts.table.clone(),
        };
        let records = self.back.read(cancel, key, opts).await?;
        for record in &records {
            self.front
                .write(cancel, record.clone(), populate.clone())
                .await
                .inspect_err(|e| {
                    warn!(store = "cache", key = %record.key, error = %e, "Failed to populate front store");
                })?;
        }
        debug!(store = "cache", key, populated = records.len(), "Read through to back store");
        Ok(records)
    }

    async fn write(
        &self,
        cancel: &CancellationToken,
        record: Record,
        opts: WriteOptions,
    ) -> Result<()> {
        self.front.write(cancel, record.clone(), opts.clone()).await?;

        let key = record.key.clone();
        self.back.write(cancel, record, opts).await.inspect_err(|e| {
            warn!(store = "cache", key = %key, error = %e, "Back store write failed; front store is ahead");
        })
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        key: &str,
        opts: DeleteOptions,
    ) -> Result<()> {
        self.front.delete(cancel, key, opts.clone()).await?;

        self.back.delete(cancel, key, opts).await.inspect_err(|e| {
            warn!(store = "cache", key, error = %e, "Back store delete failed; front store is ahead");
        })
    }

    async fn list(&self, cancel: &CancellationToken, opts: ListOptions) -> Result<Vec<String>> {
        match self.front.list(cancel, opts.clone()).await {
            Ok(keys) if !keys.is_empty() => {
                metrics::record_cache_lookup("front", "hit");
                return Ok(keys);
            },
            Ok(_) | Err(Error::NotFound) => metrics::record_cache_lookup("front", "miss"),
            Err(e) => return Err(e),
        }

        let keys = self.back.list(cancel, opts.clone()).await?;
        let read_opts = ReadOptions {
            database: opts.database.clone(),
            table: opts.table.clone(),
            ..ReadOptions::default()
        };
        let write_opts = WriteOptions {
            ttl: None,
            database: opts.database,
            table: opts.table,
        };
        for key in &keys {
            let records = match self.back.read(cancel, key, read_opts.clone()).await {
                Ok(records) => records,
                // Expired between the listing and this read
                Err(Error::NotFound) => continue,
                Err(e) => return Err(e),
            };
            for record in records {
                self.front.write(cancel, record, write_opts.clone()).await?;
            }
        }
        debug!(store = "cache", populated = keys.len(), "Listed through to back store");
        Ok(keys)
    }

    async fn close(&self) -> Result<()> {
        self.front.close().await?;
        self.back.close().await
    }

    fn name(&self) -> &'static str {
        "cache"
    }
}
