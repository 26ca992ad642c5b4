//! Transaction manager that journals committed writes.
//!
//! Writes staged on a [`JournalTx`] only reach the shared journal on commit,
//! which lets executor tests tell committed, rolled back and never-executed
//! sections apart.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tastebud_core::transaction::Result;
use tastebud_core::{TransactionError, TransactionManager};

#[derive(Debug, Default)]
struct Inner {
    committed: Mutex<Vec<String>>,
    begun: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_commit: AtomicBool,
}

/// Journaling transaction manager for tests.
#[derive(Debug, Clone, Default)]
pub struct JournalTransactions {
    inner: Arc<Inner>,
}

/// Transaction handle of [`JournalTransactions`].
#[derive(Debug, Default)]
pub struct JournalTx {
    staged: Vec<String>,
}

impl JournalTx {
    /// Stage a write.
    pub fn write(&mut self, entry: impl Into<String>) {
        self.staged.push(entry.into());
    }

    /// Writes staged so far.
    #[must_use]
    pub fn staged(&self) -> &[String] {
        &self.staged
    }
}

impl JournalTransactions {
    /// Create an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every committed write, in commit order.
    #[must_use]
    pub fn committed(&self) -> Vec<String> {
        self.inner
            .committed
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Number of transactions opened.
    #[must_use]
    pub fn begun(&self) -> usize {
        self.inner.begun.load(Ordering::SeqCst)
    }

    /// Number of transactions committed.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    /// Number of transactions rolled back.
    #[must_use]
    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    /// Make every commit fail until reset.
    pub fn set_fail_commit(&self, fail: bool) {
        self.inner.fail_commit.store(fail, Ordering::SeqCst);
    }
}

impl TransactionManager for JournalTransactions {
    type Tx = JournalTx;

    async fn begin(&self) -> Result<JournalTx> {
        self.inner.begun.fetch_add(1, Ordering::SeqCst);
        Ok(JournalTx::default())
    }

    async fn commit(&self, tx: JournalTx) -> Result<()> {
        if self.inner.fail_commit.load(Ordering::SeqCst) {
            self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
            return Err(TransactionError::Commit("injected commit failure".into()));
        }

        self.inner
            .committed
            .lock()
            .map_err(|_| TransactionError::Commit("Mutex lock failed".into()))?
            .extend(tx.staged);
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, tx: JournalTx) -> Result<()> {
        drop(tx);
        self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
