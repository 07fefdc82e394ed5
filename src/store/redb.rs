//! Redb-backed file store.
//!
//! Persists each namespace in its own redb database at
//! `<dir>/<database>/<table>.redb`, giving ACID writes and ordered key scans.

use anyhow::{Context, bail};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::backend::{Store, ensure_active};
use super::error::{Error, Result};
use super::query::{KeyMatch, Window};
use super::types::{
    DeleteOptions, ListOptions, Namespace, Options, ReadOptions, Record, WriteOptions,
};
use crate::constants::{DB_FILE_EXTENSION, DEFAULT_DIR_COMPONENTS, DIR_ENV_VAR};

/// Table holding records inside every namespace database.
pub(crate) const RECORDS_TABLE: TableDefinition<'static, &'static str, &'static [u8]> =
    TableDefinition::new("records");

/// On-disk form of a record, serialized as JSON.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    value: Vec<u8>,
    /// Deadline in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl StoredEntry {
    fn new(record: Record, expiry: Duration, now_ms: i64) -> Self {
        // Round up so a sub-millisecond TTL still outlives the write
        let ttl_ms = i64::try_from(expiry.as_nanos().div_ceil(1_000_000)).unwrap_or(i64::MAX);
        Self {
            value: record.value,
            expires_at: (!expiry.is_zero()).then(|| now_ms.saturating_add(ttl_ms)),
            metadata: record.metadata,
        }
    }

    fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|exp| now_ms >= exp)
    }

    fn into_record(self, key: &str, now_ms: i64) -> Record {
        let remaining = self
            .expires_at
            .map_or(0, |exp| u64::try_from(exp - now_ms).unwrap_or(0));
        Record {
            key: key.to_string(),
            value: self.value,
            expiry: Duration::from_millis(remaining),
            metadata: self.metadata,
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Rejects names that would escape the store directory.
fn validate_component(kind: &str, name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        bail!("{kind} name cannot be empty");
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        bail!("{kind} name '{name}' is not a valid path component");
    }
    Ok(())
}

/// Default base directory: `$STOWAGE_DIR`, else `<temp>/micro/store`.
pub fn default_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DIR_ENV_VAR)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    DEFAULT_DIR_COMPONENTS
        .iter()
        .fold(std::env::temp_dir(), |path, part| path.join(part))
}

/// Redb-backed file store.
///
/// Provides persistent storage with ACID guarantees. Database handles are
/// opened on first use of a namespace and kept until [`close`](Store::close);
/// operations after a close reopen them lazily.
///
/// # Thread Safety
///
/// `FileStore` is `Clone` and can be shared across threads. Every redb
/// transaction runs on tokio's blocking pool.
#[derive(Clone)]
pub struct FileStore {
    dir: PathBuf,
    options: Arc<RwLock<Options>>,
    dbs: Arc<DashMap<Namespace, Arc<Database>>>,
}

impl FileStore {
    /// Creates a store rooted at `dir`, bound to the default namespace.
    ///
    /// Nothing touches the filesystem until the first operation or
    /// [`initialize`](Store::initialize).
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self::with_options(dir, Options::default())
    }

    /// Creates a store rooted at `dir`, bound to `options`' namespace.
    pub fn with_options<P: AsRef<Path>>(dir: P, options: Options) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            options: Arc::new(RwLock::new(options)),
            dbs: Arc::new(DashMap::new()),
        }
    }

    /// Base directory of this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Database file backing `ns`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database or table name is not a valid path
    /// component.
    pub fn db_path(&self, ns: &Namespace) -> anyhow::Result<PathBuf> {
        validate_component("database", &ns.database)?;
        validate_component("table", &ns.table)?;
        Ok(self
            .dir
            .join(&ns.database)
            .join(format!("{}.{DB_FILE_EXTENSION}", ns.table)))
    }

    /// Opens (creating if needed) the database for `ns`.
    fn open_db(&self, ns: &Namespace) -> anyhow::Result<Arc<Database>> {
        match self.dbs.entry(ns.clone()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let path = self.db_path(ns)?;
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create store directory: {}", parent.display())
                    })?;
                }

                let db = Database::create(&path)
                    .with_context(|| format!("Failed to open database: {}", path.display()))?;

                // Create the table up front so read transactions can open it
                let write_txn = db
                    .begin_write()
                    .context("Failed to begin initialization transaction")?;
                {
                    let _table = write_txn
                        .open_table(RECORDS_TABLE)
                        .context("Failed to initialize records table")?;
                }
                write_txn
                    .commit()
                    .context("Failed to commit initialization transaction")?;

                debug!(store = "file", namespace = %ns, path = %path.display(), "Opened database");
                Ok(Arc::clone(entry.insert(Arc::new(db)).value()))
            },
        }
    }

    /// Like [`open_db`](Self::open_db) but never creates a missing database.
    fn existing_db(&self, ns: &Namespace) -> anyhow::Result<Option<Arc<Database>>> {
        if let Some(db) = self.dbs.get(ns) {
            return Ok(Some(Arc::clone(db.value())));
        }
        if !self.db_path(ns)?.exists() {
            return Ok(None);
        }
        self.open_db(ns).map(Some)
    }

    /// Collects live matches in key order and the expired keys passed over.
    fn scan_sync(
        db: &Database,
        matcher: KeyMatch<'_>,
        window: Window,
        now_ms: i64,
    ) -> anyhow::Result<(Vec<Record>, Vec<String>)> {
        let read_txn = db
            .begin_read()
            .context("Failed to begin read transaction")?;
        let table = read_txn
            .open_table(RECORDS_TABLE)
            .context("Failed to open records table")?;

        let mut matched = Vec::new();
        let mut expired = Vec::new();
        for item in table
            .range(matcher.lower_bound()..)
            .context("Failed to scan records table")?
        {
            let (key, value) = item.context("Failed to read record")?;
            let key = key.value();
            if !matcher.in_range(key) {
                break;
            }
            if !matcher.matches(key) {
                continue;
            }

            let entry: StoredEntry = serde_json::from_slice(value.value())
                .with_context(|| format!("Failed to deserialize record '{key}'"))?;
            if entry.is_expired_at(now_ms) {
                expired.push(key.to_string());
                continue;
            }
            matched.push(entry.into_record(key, now_ms));
            if window.end().is_some_and(|end| matched.len() >= end) {
                break;
            }
        }

        Ok((window.apply(matched.into_iter()).collect(), expired))
    }

    /// Removes keys seen expired, unless rewritten since.
    fn reclaim_sync(db: &Database, expired: &[String], now_ms: i64) -> anyhow::Result<()> {
        if expired.is_empty() {
            return Ok(());
        }
        let write_txn = db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;
            for key in expired {
                let still_expired = match table.get(key.as_str())? {
                    Some(value) => serde_json::from_slice::<StoredEntry>(value.value())
                        .is_ok_and(|entry| entry.is_expired_at(now_ms)),
                    None => false,
                };
                if still_expired {
                    table
                        .remove(key.as_str())
                        .with_context(|| format!("Failed to remove key '{key}'"))?;
                }
            }
        }
        write_txn
            .commit()
            .context("Failed to commit cleanup transaction")?;
        Ok(())
    }

    fn query_sync(
        &self,
        ns: &Namespace,
        matcher: KeyMatch<'_>,
        window: Window,
    ) -> anyhow::Result<Vec<Record>> {
        let Some(db) = self.existing_db(ns)? else {
            return Ok(Vec::new());
        };
        let now_ms = now_millis();
        let (records, expired) = Self::scan_sync(&db, matcher, window, now_ms)?;
        if let Err(e) = Self::reclaim_sync(&db, &expired, now_ms) {
            debug!(store = "file", namespace = %ns, error = %e, "Failed to reclaim expired records");
        }
        Ok(records)
    }

    fn write_sync(&self, ns: &Namespace, record: Record, expiry: Duration) -> anyhow::Result<()> {
        let db = self.open_db(ns)?;
        let key = record.key.clone();
        let entry = StoredEntry::new(record, expiry, now_millis());
        let json = serde_json::to_vec(&entry).context("Failed to serialize record to JSON")?;

        let write_txn = db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;
            table
                .insert(key.as_str(), json.as_slice())
                .with_context(|| format!("Failed to insert key '{key}'"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit write transaction")?;
        Ok(())
    }

    fn delete_sync(&self, ns: &Namespace, key: &str) -> anyhow::Result<()> {
        let Some(db) = self.existing_db(ns)? else {
            return Ok(());
        };
        let write_txn = db
            .begin_write()
            .context("Failed to begin write transaction")?;
        {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;
            table
                .remove(key)
                .with_context(|| format!("Failed to remove key '{key}'"))?;
        }
        write_txn
            .commit()
            .context("Failed to commit delete transaction")?;
        Ok(())
    }
}

/// Runs `f` on the blocking pool, giving up as soon as `cancel` fires.
///
/// A transaction already running when the token fires still completes in
/// the background; only the caller stops waiting for it.
async fn run_blocking<T, F>(cancel: &CancellationToken, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    ensure_active(cancel)?;
    let task = tokio::task::spawn_blocking(f);
    tokio::select! {
        () = cancel.cancelled() => Err(Error::Cancelled),
        joined = task => joined.context("Task join error")?,
    }
}

#[async_trait]
impl Store for FileStore {
    async fn initialize(&self, cancel: &CancellationToken, options: Options) -> Result<()> {
        let store = self.clone();
        let ns = options.namespace();
        run_blocking(cancel, move || {
            store
                .open_db(&ns)
                .map(|_| ())
                .map_err(|e| Error::init(ns, e))
        })
        .await?;
        debug!(store = "file", namespace = %options.namespace(), "Bound namespace");
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
        let store = self.clone();
        let ns = opts.target(&self.options());
        let key = key.to_string();
        let exact = opts.is_exact();
        let records = run_blocking(cancel, move || {
            let matcher = KeyMatch::for_read(&key, &opts);
            Ok(store.query_sync(&ns, matcher, Window::from(&opts))?)
        })
        .await?;

        if records.is_empty() && exact {
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
        let store = self.clone();
        let ns = opts.target(&self.options());
        let expiry = opts.effective_expiry(&record);
        run_blocking(cancel, move || Ok(store.write_sync(&ns, record, expiry)?)).await
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        key: &str,
        opts: DeleteOptions,
    ) -> Result<()> {
        let store = self.clone();
        let ns = opts.target(&self.options());
        let key = key.to_string();
        run_blocking(cancel, move || Ok(store.delete_sync(&ns, &key)?)).await
    }

    async fn list(&self, cancel: &CancellationToken, opts: ListOptions) -> Result<Vec<String>> {
        let store = self.clone();
        let ns = opts.target(&self.options());
        run_blocking(cancel, move || {
            let matcher = KeyMatch::for_list(&opts);
            let records = store.query_sync(&ns, matcher, Window::from(&opts))?;
            Ok(records.into_iter().map(|record| record.key).collect())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let open = self.dbs.len();
        self.dbs.clear();
        debug!(store = "file", databases = open, "Closed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
