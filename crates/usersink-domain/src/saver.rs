//! Bounded write buffer with periodic background flushing.
//!
//! Producers call [`Saver::save`], which never blocks on I/O. A background
//! task started by [`Saver::start`] wakes on every [`Ticker`] signal and
//! flushes the buffer through a [`Flusher`]. [`Saver::stop`] performs one
//! final flush and waits for the task to exit.
//!
//! # Overflow
//!
//! The buffer holds at most `capacity` users. Saving into a full buffer
//! evicts the oldest user first; evictions are counted and reported on the
//! next flush.
//!
//! # Partial flushes
//!
//! When the store rejects a chunk, the users that were not persisted stay at
//! the front of the buffer, followed by anything saved while the flush was
//! running, and are retried on the next tick. After the final flush there is
//! no next tick, so whatever is still buffered at that point is lost to
//! automatic draining and logged as an error.
//!
//! # Locking
//!
//! The buffer lock is held only to take a snapshot and to splice back the
//! unpersisted suffix, never across the storage call. A separate async gate
//! keeps flushes strictly sequential.
//!
//! # Cancellation
//!
//! [`Saver::flush`] is cancel-safe. If its future is dropped while storage
//! calls are in flight, the chunks already stored stay stored and the rest
//! of the snapshot goes back to the front of the buffer, exactly as after a
//! failed chunk.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use usersink_storage::{User, UserStore};

use crate::config::SaverConfig;
use crate::error::{DomainError, DomainResult};
use crate::flusher::{FlushOutcome, Flusher};
use crate::ticker::{Ticker, TickerSignal};

struct SaverInner<S> {
    buffer: Mutex<VecDeque<User>>,
    capacity: usize,
    flusher: Flusher<S>,
    flush_gate: tokio::sync::Mutex<()>,
    evicted: AtomicU64,
    evicted_reported: AtomicU64,
}

impl<S: UserStore> SaverInner<S> {
    fn save(&self, user: User) {
        let mut buffer = self.buffer.lock();
        if buffer.len() == self.capacity {
            if buffer.pop_front().is_some() {
                let evicted = self.evicted.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    capacity = self.capacity,
                    evicted_total = evicted,
                    "buffer full, evicted oldest user"
                );
            }
        }
        buffer.push_back(user);
    }

    async fn flush(&self) -> FlushOutcome {
        let _gate = self.flush_gate.lock().await;
        self.report_evictions();

        let snapshot: Vec<User> = self.buffer.lock().drain(..).collect();
        if snapshot.is_empty() {
            return FlushOutcome::default();
        }

        let mut pending = PendingFlush {
            inner: self,
            snapshot,
            progress: AtomicUsize::new(0),
            settled: false,
        };
        let outcome = self
            .flusher
            .flush_tracked(&pending.snapshot, &pending.progress)
            .await;
        pending.settle(outcome.persisted);
        outcome
    }

    /// Puts `snapshot[persisted..]` back in front of anything saved since the
    /// snapshot was taken.
    fn retain_unpersisted(&self, mut snapshot: Vec<User>, persisted: usize) {
        let unpersisted = snapshot.split_off(persisted);
        let retained = unpersisted.len();

        let mut buffer = self.buffer.lock();
        let newer = std::mem::take(&mut *buffer);
        let mut merged = VecDeque::from(unpersisted);
        merged.extend(newer);

        let overflow = merged.len().saturating_sub(self.capacity);
        if overflow > 0 {
            merged.drain(..overflow);
            self.evicted.fetch_add(overflow as u64, Ordering::Relaxed);
        }
        *buffer = merged;

        warn!(
            persisted,
            retained,
            evicted = overflow,
            buffered = buffer.len(),
            "partial flush, unpersisted users kept for the next attempt"
        );
    }

    fn report_evictions(&self) {
        let total = self.evicted.load(Ordering::Relaxed);
        let reported = self.evicted_reported.swap(total, Ordering::Relaxed);
        if total > reported {
            warn!(
                dropped = total - reported,
                total_dropped = total,
                capacity = self.capacity,
                "users evicted from full buffer since last flush"
            );
        }
    }
}

/// A drained snapshot whose unpersisted part must end up back in the buffer,
/// whether the flush completes or its future is dropped mid-write.
struct PendingFlush<'a, S: UserStore> {
    inner: &'a SaverInner<S>,
    snapshot: Vec<User>,
    progress: AtomicUsize,
    settled: bool,
}

impl<S: UserStore> PendingFlush<'_, S> {
    fn settle(&mut self, persisted: usize) {
        self.settled = true;
        if persisted < self.snapshot.len() {
            let snapshot = std::mem::take(&mut self.snapshot);
            self.inner.retain_unpersisted(snapshot, persisted);
        }
    }
}

impl<S: UserStore> Drop for PendingFlush<'_, S> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let persisted = self.progress.load(Ordering::Acquire);
        warn!(
            persisted,
            attempted = self.snapshot.len(),
            "flush cancelled, keeping unpersisted users"
        );
        self.settle(persisted);
    }
}

struct Worker {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<FlushOutcome>,
}

enum Lifecycle {
    Idle,
    Running(Worker),
    Stopped,
}

/// Bounded, periodically flushed user buffer.
///
/// Share it behind an `Arc`; every method takes `&self`. Dropping a running
/// saver without calling [`Saver::stop`] still triggers the final flush, but
/// in the background with nobody to await it.
pub struct Saver<S> {
    inner: Arc<SaverInner<S>>,
    config: SaverConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl<S> std::fmt::Debug for Saver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saver")
            .field("config", &self.config)
            .field("buffered", &self.inner.buffer.lock().len())
            .field("evicted", &self.inner.evicted.load(Ordering::Relaxed))
            .field(
                "running",
                &matches!(*self.lifecycle.lock(), Lifecycle::Running(_)),
            )
            .finish()
    }
}

impl<S: UserStore> Saver<S> {
    /// Creates an idle saver. Invalid configuration is rejected here.
    pub fn new(store: Arc<S>, config: SaverConfig) -> DomainResult<Self> {
        config.validate()?;

        let flusher =
            Flusher::new(store, config.chunk_size)?.with_chunk_timeout(config.chunk_timeout);
        Ok(Self {
            inner: Arc::new(SaverInner {
                buffer: Mutex::new(VecDeque::with_capacity(config.capacity)),
                capacity: config.capacity,
                flusher,
                flush_gate: tokio::sync::Mutex::new(()),
                evicted: AtomicU64::new(0),
                evicted_reported: AtomicU64::new(0),
            }),
            config,
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Appends a user, evicting the oldest one if the buffer is full.
    pub fn save(&self, user: User) {
        self.inner.save(user);
    }

    /// Flushes the current contents now.
    ///
    /// Waits for any flush already in progress. On partial success the
    /// unpersisted suffix is kept for the next attempt.
    pub async fn flush(&self) -> FlushOutcome {
        self.inner.flush().await
    }

    /// Starts the background flush task.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`DomainError::InvalidState`] if already running or stopped.
    pub fn start(&self) -> DomainResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Idle => {}
            Lifecycle::Running(_) => {
                return Err(DomainError::InvalidState {
                    message: "saver is already running".to_string(),
                })
            }
            Lifecycle::Stopped => {
                return Err(DomainError::InvalidState {
                    message: "saver has been stopped".to_string(),
                })
            }
        }

        let mut ticker = Ticker::new(self.config.flush_interval)?;
        let signal = ticker
            .signal()
            .ok_or_else(|| DomainError::InvalidState {
                message: "ticker signal already taken".to_string(),
            })?;
        ticker.start()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(Arc::clone(&self.inner), ticker, signal, shutdown_rx));
        *lifecycle = Lifecycle::Running(Worker { shutdown_tx, task });

        info!(
            capacity = self.config.capacity,
            chunk_size = self.config.chunk_size,
            flush_interval_ms =
                u64::try_from(self.config.flush_interval.as_millis()).unwrap_or(u64::MAX),
            "saver started"
        );
        Ok(())
    }

    /// Stops background flushing after one final flush and returns its
    /// outcome.
    ///
    /// Does not return until the final flush has completed and the
    /// background task has exited. Users still buffered afterwards are not
    /// flushed again automatically. On a saver that was never started this
    /// performs the final flush directly.
    pub async fn stop(&self) -> FlushOutcome {
        let previous = {
            let mut lifecycle = self.lifecycle.lock();
            std::mem::replace(&mut *lifecycle, Lifecycle::Stopped)
        };

        let outcome = match previous {
            Lifecycle::Running(Worker { shutdown_tx, task }) => {
                let _ = shutdown_tx.send(());
                match task.await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(error = %e, "saver task failed, flushing from caller");
                        self.inner.flush().await
                    }
                }
            }
            Lifecycle::Idle | Lifecycle::Stopped => self.inner.flush().await,
        };

        let remaining = self.len();
        if remaining > 0 {
            error!(
                lost = remaining,
                persisted = outcome.persisted,
                attempted = outcome.attempted,
                "final flush incomplete, buffered users will not be persisted"
            );
        } else {
            info!(persisted = outcome.persisted, "saver stopped");
        }
        outcome
    }

    /// Whether the background task is running.
    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }

    /// Number of buffered users.
    pub fn len(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.buffer.lock().is_empty()
    }

    /// Maximum number of buffered users.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Copy of the buffered users, oldest first.
    pub fn snapshot(&self) -> Vec<User> {
        self.inner.buffer.lock().iter().cloned().collect()
    }

    /// Total number of users dropped because the buffer was full.
    pub fn evicted_count(&self) -> u64 {
        self.inner.evicted.load(Ordering::Relaxed)
    }
}

async fn run<S: UserStore>(
    inner: Arc<SaverInner<S>>,
    mut ticker: Ticker,
    mut signal: TickerSignal,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> FlushOutcome {
    loop {
        tokio::select! {
            biased;
            // Explicit stop, or the Saver was dropped.
            _ = &mut shutdown_rx => break,
            true = signal.tick() => {
                inner.flush().await;
            }
        }
    }

    ticker.stop().await;
    inner.flush().await
}
