//! The work dispatcher.
//!
//! ```text
//! ┌─────────────┐     ┌───────────────────┐
//! │   axum      │ ──► │  bounded queue    │ ──► worker 1 ─┐
//! │  (webhook)  │     │  (mpsc, shared    │ ──► worker 2 ─┼──► UnitHandler
//! └─────────────┘     │   receiver)       │ ──► worker N ─┘
//!       │             └───────────────────┘
//!       │ returns 200 "ok" without waiting
//!       ▼
//! ```
//!
//! Units run once, in no particular order, on whichever worker takes them
//! first. A unit that fails (or panics) is logged and reported through its
//! handler, and is never requeued.

use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::message::WorkUnit;

/// Why a unit could not be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("work queue is full")]
    Full,

    #[error("work queue is closed")]
    Closed,
}

/// Executes work units.
pub trait UnitHandler: Send + Sync + 'static {
    type Error: Display + Send;

    fn handle(&self, unit: &WorkUnit) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Called with the error of a failed unit.
    fn report(&self, unit: &WorkUnit, error: &str) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl DispatcherConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        DispatcherConfig {
            worker_count: config.worker_count,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// A bounded queue drained by a fixed pool of workers.
pub struct Dispatcher {
    tx: mpsc::Sender<WorkUnit>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawns the worker pool.
    pub fn start<H: UnitHandler>(handler: Arc<H>, config: DispatcherConfig) -> Self {
        Self::start_with_shutdown(handler, config, CancellationToken::new())
    }

    /// Like [`Dispatcher::start`], stopping when `shutdown` is cancelled.
    pub fn start_with_shutdown<H: UnitHandler>(
        handler: Arc<H>,
        config: DispatcherConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let worker_count = config.worker_count.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(AsyncMutex::new(rx));

        info!(
            workers = worker_count,
            capacity = config.queue_capacity,
            "Starting dispatcher"
        );
        let workers = (0..worker_count)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&handler),
                    Arc::clone(&rx),
                    shutdown.child_token(),
                ))
            })
            .collect();

        Dispatcher {
            tx,
            shutdown,
            workers: Mutex::new(workers),
        }
    }

    /// Queues a unit without waiting for it to run.
    pub fn enqueue(&self, unit: WorkUnit) -> Result<(), EnqueueError> {
        if self.shutdown.is_cancelled() {
            return Err(EnqueueError::Closed);
        }
        self.tx.try_send(unit).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Stops intake, lets running units finish, and waits for the workers.
    ///
    /// Units still queued when shutdown starts are dropped.
    pub async fn shutdown(&self) {
        info!("Shutting down dispatcher");
        self.shutdown.cancel();

        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker task failed");
            }
        }
        info!("Dispatcher stopped");
    }
}

async fn run_worker<H: UnitHandler>(
    id: usize,
    handler: Arc<H>,
    rx: Arc<AsyncMutex<mpsc::Receiver<WorkUnit>>>,
    cancel: CancellationToken,
) {
    debug!(worker = id, "Worker started");
    loop {
        let unit = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                unit = rx.recv() => match unit {
                    Some(unit) => unit,
                    None => break,
                },
            }
        };
        process(id, &handler, unit).await;
    }
    debug!(worker = id, "Worker stopped");
}

/// Runs one unit on its own task so a panic cannot take the worker down.
async fn process<H: UnitHandler>(worker: usize, handler: &Arc<H>, unit: WorkUnit) {
    debug!(worker, kind = unit.kind.as_str(), sender = %unit.sender, "Processing unit");

    let task = {
        let handler = Arc::clone(handler);
        let unit = unit.clone();
        tokio::spawn(async move {
            handler
                .handle(&unit)
                .await
                .map_err(|e| e.to_string())
        })
    };

    let failure = match task.await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e,
        Err(e) if e.is_panic() => "handler panicked".to_string(),
        Err(e) => e.to_string(),
    };
    warn!(worker, kind = unit.kind.as_str(), sender = %unit.sender, error = %failure, "Unit failed");
    handler.report(&unit, &failure).await;
}
