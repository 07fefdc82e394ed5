//! The operation contract every store backend implements.
//!
//! Defines the interface shared by the memory, file and cache stores,
//! enabling pluggable storage behind a single `Arc<dyn Store>`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::error::{Error, Result};
use super::types::{DeleteOptions, ListOptions, Options, ReadOptions, Record, WriteOptions};

/// Namespaced key-value storage with TTL expiry.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio and
/// handle their own internal locking. A store is bound to one namespace at a
/// time; [`initialize`](Store::initialize) rebinds it and may be called any
/// number of times, including after [`close`](Store::close).
///
/// Every async operation receives the caller's cancellation token. A token
/// that is already cancelled fails the call with [`Error::Cancelled`] before
/// anything is mutated.
///
/// # Example
///
/// ```ignore
/// use stowage::store::{MemoryStore, ReadOptions, Record, Store, WriteOptions};
/// use tokio_util::sync::CancellationToken;
///
/// let store = MemoryStore::new();
/// let cancel = CancellationToken::new();
/// store.write(&cancel, Record::new("key", "value"), WriteOptions::default()).await?;
/// let records = store.read(&cancel, "key", ReadOptions::default()).await?;
/// ```
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Binds the store to `options`' namespace, replacing the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Init`] if the backend cannot prepare resources for the
    /// namespace. The previously bound namespace stays in effect.
    async fn initialize(&self, cancel: &CancellationToken, options: Options) -> Result<()>;

    /// Snapshot of the bound namespace.
    fn options(&self) -> Options;

    /// Reads live records matching `key` under `opts`, in ascending key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if an exact-key read matches nothing. A
    /// prefix or suffix read with no matches returns `Ok` with no records.
    async fn read(
        &self,
        cancel: &CancellationToken,
        key: &str,
        opts: ReadOptions,
    ) -> Result<Vec<Record>>;

    /// Creates or overwrites `record`, replacing any previous deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn write(
        &self,
        cancel: &CancellationToken,
        record: Record,
        opts: WriteOptions,
    ) -> Result<()>;

    /// Removes `key`. Deleting an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn delete(&self, cancel: &CancellationToken, key: &str, opts: DeleteOptions)
    -> Result<()>;

    /// Lists live keys matching `opts`, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails. No matches
    /// is an empty `Ok`.
    async fn list(&self, cancel: &CancellationToken, opts: ListOptions) -> Result<Vec<String>>;

    /// Releases backend resources. The store stays usable after a later
    /// [`initialize`](Store::initialize).
    ///
    /// # Errors
    ///
    /// Returns an error if resources cannot be released.
    async fn close(&self) -> Result<()>;

    /// Implementation identifier for diagnostics.
    fn name(&self) -> &'static str;
}

/// Fails fast when the caller has already given up.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
