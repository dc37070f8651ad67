//! Crypto worker pool
//!
//! Key derivation (scrypt) and large stream jobs are CPU-bound and would
//! stall an async executor. The pool runs them on tokio's blocking threads
//! behind a fixed set of workers, each with a bounded queue:
//!
//! ```text
//!   run(job) ──round robin──▶ worker 0 [queue] ──▶ spawn_blocking(job)
//!                         └─▶ worker 1 [queue] ──▶ spawn_blocking(job)
//!                         └─▶ ...
//! ```
//!
//! A worker runs one job at a time. When every queue is full, dispatch
//! fails fast with [`CryptoError::Busy`] instead of waiting. Results come
//! back in completion order; a started job is never cancelled.

use std::sync::atomic::{AtomicUsize, Ordering};

use peerio_core::config::PoolConfig;
use secrecy::SecretString;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{CryptoError, Result};
use crate::kdf::DerivedKey;
use crate::keys::{derive_key_from_pin, derive_key_pair, Identity, KeyPair};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct CryptoPool {
    queues: Vec<mpsc::Sender<Job>>,
    next: AtomicUsize,
}

impl CryptoPool {
    /// Start the workers. Must be called from within a tokio runtime.
    pub fn new(config: &PoolConfig) -> Self {
        let workers = config.effective_workers().max(1);
        let queue_depth = config.queue_depth.max(1);

        let queues = (0..workers)
            .map(|id| {
                let (tx, rx) = mpsc::channel(queue_depth);
                tokio::spawn(worker_loop(id, rx));
                tx
            })
            .collect();

        info!(workers, queue_depth, "crypto pool started");
        Self {
            queues,
            next: AtomicUsize::new(0),
        }
    }

    pub fn workers(&self) -> usize {
        self.queues.len()
    }

    /// Queue `job` without waiting for it. Starts at the next worker in
    /// round-robin order and falls through to the others if its queue is
    /// full.
    pub fn dispatch<T, F>(&self, job: F) -> Result<oneshot::Receiver<Result<T>>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut job: Job = Box::new(move || {
            // The caller may have stopped waiting.
            let _ = tx.send(job());
        });

        let n = self.queues.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        let mut closed = 0;
        for i in 0..n {
            let worker = (start + i) % n;
            match self.queues[worker].try_send(job) {
                Ok(()) => return Ok(rx),
                Err(mpsc::error::TrySendError::Full(returned)) => job = returned,
                Err(mpsc::error::TrySendError::Closed(returned)) => {
                    warn!(worker, "crypto worker queue closed");
                    closed += 1;
                    job = returned;
                }
            }
        }

        if closed == n {
            Err(CryptoError::WorkerGone)
        } else {
            debug!(workers = n, "all crypto worker queues full");
            Err(CryptoError::Busy)
        }
    }

    /// Run `job` on a worker and wait for its result.
    pub async fn run<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.dispatch(job)?
            .await
            .map_err(|_| CryptoError::WorkerGone)?
    }

    pub async fn derive_key_pair(&self, username: &str, passphrase: SecretString) -> Result<KeyPair> {
        let username = username.to_string();
        self.run(move || derive_key_pair(&username, &passphrase)).await
    }

    pub async fn derive_identity(&self, username: &str, passphrase: SecretString) -> Result<Identity> {
        let owned = username.to_string();
        let key_pair = self.derive_key_pair(&owned, passphrase).await?;
        Ok(Identity::from_key_pair(&owned, key_pair))
    }

    pub async fn derive_key_from_pin(&self, pin: SecretString, username: &str) -> Result<DerivedKey> {
        let username = username.to_string();
        self.run(move || derive_key_from_pin(&pin, &username)).await
    }
}

async fn worker_loop(id: usize, mut jobs: mpsc::Receiver<Job>) {
    while let Some(job) = jobs.recv().await {
        if let Err(e) = tokio::task::spawn_blocking(job).await {
            warn!(worker = id, error = %e, "crypto job panicked");
        }
    }
    debug!(worker = id, "crypto worker stopped");
}
