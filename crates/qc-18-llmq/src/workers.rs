//! # Background Work
//!
//! `Interrupt` is the shutdown signal every background task observes.
//! `WorkerPool` bounds how much CPU-heavy quorum work (public key share
//! derivation, contribution aggregation) runs at once; async tasks such as
//! data recovery are spawned through it so they share the same lifetime.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::debug;

/// Cooperative shutdown signal.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl Interrupt {
    /// Signal that is not raised.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Idempotent.
    pub fn raise(&self) {
        self.tx.send_replace(true);
    }

    /// True once raised.
    pub fn is_raised(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once raised.
    pub async fn raised(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|raised| *raised).await;
    }

    /// Sleep for `duration` unless raised first. Returns `false` if the sleep
    /// was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_raised(),
            _ = rx.changed() => false,
        }
    }
}

/// Bounded pool for quorum background work.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Pool with `size` concurrent jobs; derived from the core count when
    /// `None`.
    pub fn new(size: Option<usize>) -> Self {
        let size = size
            .unwrap_or_else(|| default_worker_count(num_cpus::get()))
            .max(1);
        debug!("[qc-18] Worker pool sized to {} jobs", size);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Concurrent job limit.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run a CPU-bound closure on the blocking pool once a slot is free.
    pub fn spawn_blocking<F, R>(&self, job: F) -> JoinHandle<Option<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok()?;
            tokio::task::spawn_blocking(job).await.ok()
        })
    }

    /// Fire-and-forget CPU job. Runs inline when called outside a runtime.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if Handle::try_current().is_ok() {
            drop(self.spawn_blocking(job));
        } else {
            job();
        }
    }

    /// Run an async task. Async tasks mostly wait on the network and do not
    /// take a slot. `None` outside a runtime.
    pub fn spawn<F>(&self, task: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = Handle::try_current().ok()?;
        Some(handle.spawn(task))
    }
}

/// Half the cores, at least one and at most four.
pub fn default_worker_count(cores: usize) -> usize {
    (cores / 2).clamp(1, 4)
}
