//! In-memory store backend.
//!
//! Keeps one ordered `BTreeMap` per namespace inside a `DashMap`, so prefix
//! reads narrow to a key range and each namespace is guarded by its own
//! shard lock. This is the reference implementation of the contract and the
//! front layer of [`CacheStore`](super::CacheStore).

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::backend::{Store, ensure_active};
use super::error::{Error, Result};
use super::query::{KeyMatch, Window};
use super::types::{
    DeleteOptions, ListOptions, Namespace, Options, ReadOptions, Record, WriteOptions,
};

type Table = BTreeMap<String, MemoryEntry>;
type Tables = DashMap<Namespace, Table>;

/// Entry stored in the memory backend with optional expiration.
#[derive(Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    metadata: BTreeMap<String, serde_json::Value>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(record: Record, expiry: Duration, now: Instant) -> Self {
        Self {
            value: record.value,
            metadata: record.metadata,
            // A deadline beyond what `Instant` can represent never arrives
            expires_at: if expiry.is_zero() {
                None
            } else {
                now.checked_add(expiry)
            },
        }
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    fn to_record(&self, key: &str, now: Instant) -> Record {
        Record {
            key: key.to_string(),
            value: self.value.clone(),
            expiry: self
                .expires_at
                .map_or(Duration::ZERO, |exp| exp.saturating_duration_since(now)),
            metadata: self.metadata.clone(),
        }
    }
}

/// Walks `table` in key order and applies the window to live matches.
///
/// Also returns the expired keys it stepped over so the caller can reclaim
/// them once the read guard is released.
fn scan<T>(
    table: &Table,
    matcher: KeyMatch<'_>,
    window: Window,
    now: Instant,
    mut project: impl FnMut(&str, &MemoryEntry) -> T,
) -> (Vec<T>, Vec<String>) {
    let mut expired = Vec::new();
    let live = table
        .range::<str, _>((Bound::Included(matcher.lower_bound()), Bound::Unbounded))
        .take_while(|(key, _)| matcher.in_range(key))
        .filter(|(key, _)| matcher.matches(key))
        .filter(|(key, entry)| {
            if entry.is_expired_at(now) {
                expired.push((*key).clone());
                false
            } else {
                true
            }
        });
    let out = window
        .apply(live)
        .map(|(key, entry)| project(key, entry))
        .collect();
    (out, expired)
}

/// Removes expired entries one namespace at a time.
fn purge(tables: &Tables, now: Instant) -> usize {
    let namespaces: Vec<Namespace> = tables.iter().map(|t| t.key().clone()).collect();
    let mut removed = 0;
    for ns in namespaces {
        if let Some(mut table) = tables.get_mut(&ns) {
            let before = table.len();
            table.retain(|_, entry| !entry.is_expired_at(now));
            removed += before - table.len();
        }
        tables.remove_if(&ns, |_, table| table.is_empty());
    }
    removed
}

/// In-memory store backend.
///
/// Provides fast, concurrent access without persistence. All data is lost
/// on [`close`](Store::close) or when the store is dropped. Ideal for:
/// - Testing and development
/// - The front layer of a [`CacheStore`](super::CacheStore)
/// - Service-local caching
///
/// Expired entries are never returned and are removed lazily when a read or
/// list steps over them. [`MemoryStore::with_sweep_interval`] additionally
/// runs a background sweep on the tokio runtime.
///
/// # Example
///
/// ```ignore
/// use stowage::store::MemoryStore;
///
/// let store = MemoryStore::new();
/// store.write(&cancel, Record::new("key", "value"), WriteOptions::default()).await?;
/// ```
pub struct MemoryStore {
    tables: Arc<Tables>,
    options: RwLock<Options>,
    sweep_interval: Option<Duration>,
    sweeper: Mutex<Option<CancellationToken>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_options(Options::default())
    }
}

impl MemoryStore {
    /// Creates an empty store bound to the default namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store bound to `options`' namespace.
    pub fn with_options(options: Options) -> Self {
        Self {
            tables: Arc::new(DashMap::new()),
            options: RwLock::new(options),
            sweep_interval: None,
            sweeper: Mutex::new(None),
        }
    }

    /// Enables the background expiry sweep.
    ///
    /// The sweep starts immediately if called inside a tokio runtime,
    /// otherwise on the next [`initialize`](Store::initialize). A zero
    /// interval leaves sweeping disabled.
    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = (!interval.is_zero()).then_some(interval);
        self.ensure_sweeper();
        self
    }

    /// Returns the number of stored entries (including expired).
    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.value().len()).sum()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all expired entries and returns how many were dropped.
    ///
    /// Each namespace is locked for a single pass over its own entries.
    pub fn purge_expired(&self) -> usize {
        purge(&self.tables, Instant::now())
    }

    /// Returns true while a background sweep task is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    fn ensure_sweeper(&self) {
        let Some(interval) = self.sweep_interval else {
            return;
        };
        let mut sweeper = self.sweeper.lock();
        if sweeper.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let token = CancellationToken::new();
        let stop = token.clone();
        let tables: Weak<Tables> = Arc::downgrade(&self.tables);
        handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(tables) = tables.upgrade() else { break };
                        let removed = purge(&tables, Instant::now());
                        if removed > 0 {
                            debug!(store = "memory", removed, "Swept expired entries");
                        }
                    }
                }
            }
        });
        *sweeper = Some(token);
    }

    fn stop_sweeper(&self) {
        if let Some(token) = self.sweeper.lock().take() {
            token.cancel();
        }
    }

    /// Drops entries that were seen expired, unless rewritten since.
    fn reclaim(&self, ns: &Namespace, expired: &[String], now: Instant) {
        if expired.is_empty() {
            return;
        }
        if let Some(mut table) = self.tables.get_mut(ns) {
            for key in expired {
                if table.get(key).is_some_and(|entry| entry.is_expired_at(now)) {
                    table.remove(key);
                }
            }
        }
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn initialize(&self, cancel: &CancellationToken, options: Options) -> Result<()> {
        ensure_active(cancel)?;
        debug!(store = "memory", namespace = %options.namespace(), "Bound namespace");
        *self.options.write() = options;
        self.ensure_sweeper();
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
        ensure_active(cancel)?;
        let ns = opts.target(&self.options());
        let matcher = KeyMatch::for_read(key, &opts);
        let now = Instant::now();

        let (records, expired) = match self.tables.get(&ns) {
            Some(table) => scan(&table, matcher, Window::from(&opts), now, |key, entry| {
                entry.to_record(key, now)
            }),
            None => (Vec::new(), Vec::new()),
        };
        self.reclaim(&ns, &expired, now);

        if records.is_empty() && matcher.is_exact() {
            return Err(Error::NotFound);
        }
        Ok(records)
    }

    async fn write(
        &self,
        cancel: &CancellationToken,
        record: Record,
        opts: WriteOptions,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let ns = opts.target(&self.options());
        let expiry = opts.effective_expiry(&record);
        let key = record.key.clone();
        let entry = MemoryEntry::new(record, expiry, Instant::now());
        self.tables.entry(ns).or_default().insert(key, entry);
        Ok(())
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        key: &str,
        opts: DeleteOptions,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let ns = opts.target(&self.options());
        if let Some(mut table) = self.tables.get_mut(&ns) {
            table.remove(key);
        }
        Ok(())
    }

    async fn list(&self, cancel: &CancellationToken, opts: ListOptions) -> Result<Vec<String>> {
        ensure_active(cancel)?;
        let ns = opts.target(&self.options());
        let matcher = KeyMatch::for_list(&opts);
        let now = Instant::now();

        let (keys, expired) = match self.tables.get(&ns) {
            Some(table) => scan(&table, matcher, Window::from(&opts), now, |key, _| {
                key.to_string()
            }),
            None => (Vec::new(), Vec::new()),
        };
        self.reclaim(&ns, &expired, now);
        Ok(keys)
    }

    async fn close(&self) -> Result<()> {
        self.stop_sweeper();
        self.tables.clear();
        debug!(store = "memory", "Closed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
