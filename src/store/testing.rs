//! Fault-injecting store used by the decorator and conformance tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use super::backend::Store;
use super::error::{Error, Result};
use super::memory::MemoryStore;
use super::types::{DeleteOptions, ListOptions, Options, ReadOptions, Record, WriteOptions};

/// Operations that can be counted and failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Initialize,
    Read,
    Write,
    Delete,
    List,
    Close,
}

#[derive(Default)]
struct OpState {
    calls: AtomicUsize,
    failing: AtomicBool,
}

/// [`MemoryStore`] wrapper that counts calls, fails on demand, and keeps
/// every cancellation token it was handed.
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    ops: HashMap<Op, OpState>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        let ops = [
            Op::Initialize,
            Op::Read,
            Op::Write,
            Op::Delete,
            Op::List,
            Op::Close,
        ]
            .into_iter()
            .map(|op| (op, OpState::default()))
            .collect();
        Self {
            inner: MemoryStore::new(),
            ops,
            tokens: Mutex::new(Vec::new()),
        }
    }

    /// Makes `op` fail with a backend error until reset.
    pub(crate) fn fail(&self, op: Op, failing: bool) {
        self.ops[&op].failing.store(failing, Ordering::SeqCst);
    }

    /// Number of times `op` was invoked, including failed attempts.
    pub(crate) fn calls(&self, op: Op) -> usize {
        self.ops[&op].calls.load(Ordering::SeqCst)
    }

    /// True if every token received so far is cancelled (and at least one
    /// was received).
    pub(crate) fn received_tokens_all_cancelled(&self) -> bool {
        let tokens = self.tokens.lock();
        !tokens.is_empty() && tokens.iter().all(CancellationToken::is_cancelled)
    }

    fn enter(&self, op: Op, cancel: Option<&CancellationToken>) -> Result<()> {
        let state = &self.ops[&op];
        state.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(cancel) = cancel {
            self.tokens.lock().push(cancel.clone());
        }
        if state.failing.load(Ordering::SeqCst) {
            return Err(Error::Backend(anyhow::anyhow!("injected {op:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn initialize(&self, cancel: &CancellationToken, options: Options) -> Result<()> {
        self.enter(Op::Initialize, Some(cancel))?;
        self.inner.initialize(cancel, options).await
    }

    fn options(&self) -> Options {
        self.inner.options()
    }

    async fn read(
        &self,
        cancel: &CancellationToken,
        key: &str,
        opts: ReadOptions,
    ) -> Result<Vec<Record>> {
        self.enter(Op::Read, Some(cancel))?;
        self.inner.read(cancel, key, opts).await
    }

    async fn write(
        &self,
        cancel: &CancellationToken,
        record: Record,
        opts: WriteOptions,
    ) -> Result<()> {
        self.enter(Op::Write, Some(cancel))?;
        self.inner.write(cancel, record, opts).await
    }

    async fn delete(
        &self,
        cancel: &CancellationToken,
        key: &str,
        opts: DeleteOptions,
    ) -> Result<()> {
        self.enter(Op::Delete, Some(cancel))?;
        self.inner.delete(cancel, key, opts).await
    }

    async fn list(&self, cancel: &CancellationToken, opts: ListOptions) -> Result<Vec<String>> {
        self.enter(Op::List, Some(cancel))?;
        self.inner.list(cancel, opts).await
    }

    async fn close(&self) -> Result<()> {
        self.enter(Op::Close, None)?;
        self.inner.close().await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}
