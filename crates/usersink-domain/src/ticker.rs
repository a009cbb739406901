//! Periodic wake-up signal.
//!
//! A [`Ticker`] owns a background task that emits a signal every `interval`.
//! The receiving end, a [`TickerSignal`], is handed out once and is meant to
//! be consumed by a single task. Signals that arrive while the consumer is
//! still busy are coalesced rather than queued.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{trace, warn};

use crate::error::{DomainError, DomainResult};

/// Receiving end of a [`Ticker`].
#[derive(Debug)]
pub struct TickerSignal {
    rx: mpsc::Receiver<()>,
}

impl TickerSignal {
    /// Waits for the next signal. Returns false once the ticker has stopped.
    pub async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

/// Emits a recurring signal until stopped.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    signal_tx: Option<mpsc::Sender<()>>,
    signal_rx: Option<mpsc::Receiver<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Creates a stopped ticker. A zero interval is rejected.
    pub fn new(interval: Duration) -> DomainResult<Self> {
        if interval.is_zero() {
            return Err(DomainError::invalid_configuration(
                "ticker interval must be greater than 0",
            ));
        }

        // Capacity 1: at most one undelivered signal is kept.
        let (signal_tx, signal_rx) = mpsc::channel(1);
        Ok(Self {
            interval,
            signal_tx: Some(signal_tx),
            signal_rx: Some(signal_rx),
            shutdown_tx: None,
            task: None,
        })
    }

    /// Takes the receiving end. Only the first call returns `Some`.
    pub fn signal(&mut self) -> Option<TickerSignal> {
        self.signal_rx.take().map(|rx| TickerSignal { rx })
    }

    /// Whether the emission task is running.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Spawns the emission task. The first signal fires one full interval
    /// after this call.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`DomainError::InvalidState`] if already started or stopped.
    pub fn start(&mut self) -> DomainResult<()> {
        if self.task.is_some() {
            return Err(DomainError::InvalidState {
                message: "ticker is already running".to_string(),
            });
        }
        let signal_tx = self.signal_tx.take().ok_or_else(|| DomainError::InvalidState {
            message: "ticker has been stopped".to_string(),
        })?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(tokio::spawn(emit(self.interval, signal_tx, shutdown_rx)));
        Ok(())
    }

    /// Stops the emission task and waits for it to exit.
    ///
    /// No signal is sent after this returns, and the [`TickerSignal`]
    /// observes the end of the stream. Calling it again, or on a ticker that
    /// never started, is a no-op.
    pub async fn stop(&mut self) {
        // A never-started ticker still closes its signal.
        self.signal_tx.take();

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "ticker task did not exit cleanly");
            }
        }
    }
}

async fn emit(
    interval: Duration,
    signal_tx: mpsc::Sender<()>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let Some(first) = Instant::now().checked_add(interval) else {
        // Too far out to ever fire.
        let _ = shutdown_rx.await;
        return;
    };
    let mut ticks = time::interval_at(first, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            // Fires on an explicit stop and when the Ticker is dropped.
            _ = &mut shutdown_rx => break,
            _ = ticks.tick() => match signal_tx.try_send(()) {
                Ok(()) => trace!("tick"),
                Err(mpsc::error::TrySendError::Full(())) => trace!("tick coalesced"),
                Err(mpsc::error::TrySendError::Closed(())) => break,
            },
        }
    }
}
