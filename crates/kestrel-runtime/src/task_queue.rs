//! Bounded background work queue.
//!
//! Responders that call slow collaborators (a language model, a remote API)
//! hand the call to a [`TaskQueue`] instead of blocking the dispatch path.
//! A fixed set of workers drains a bounded channel; submission never waits.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::TaskConfig;

/// Why a task was not accepted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Every worker is busy and the queue is at capacity.
    #[error("task queue is full")]
    Full,

    /// The queue has been shut down.
    #[error("task queue is closed")]
    Closed,
}

/// Counters describing queue activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks accepted by [`TaskQueue::try_submit`].
    pub submitted: u64,
    /// Tasks rejected because the queue was full.
    pub rejected: u64,
    /// Tasks that ran to completion.
    pub completed: u64,
    /// Tasks abandoned at their time limit.
    pub timed_out: u64,
    /// Tasks that panicked.
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    panicked: AtomicU64,
}

struct Task {
    name: String,
    future: BoxFuture<'static, ()>,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>;

/// A fixed pool of workers fed by a bounded channel.
pub struct TaskQueue {
    sender: mpsc::Sender<Task>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
    task_timeout: Duration,
}

impl TaskQueue {
    /// Spawns `workers` workers draining a queue of `capacity` waiting tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(workers: usize, capacity: usize, task_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        let handles = (0..workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    receiver: Arc::clone(&receiver),
                    cancel: cancel.clone(),
                    counters: Arc::clone(&counters),
                    task_timeout,
                };
                tokio::spawn(worker.run())
            })
            .collect();

        debug!(workers, capacity, timeout_ms = task_timeout.as_millis() as u64, "Task queue started");

        Self {
            sender,
            cancel,
            workers: Mutex::new(handles),
            counters,
            task_timeout,
        }
    }

    /// Creates a queue from configuration.
    pub fn from_config(config: &TaskConfig) -> Self {
        Self::new(config.workers, config.queue_capacity, config.task_timeout())
    }

    /// Queues `future` without waiting.
    pub fn try_submit<F>(&self, name: impl Into<String>, future: F) -> Result<(), QueueError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(QueueError::Closed);
        }

        let task = Task {
            name: name.into(),
            future: future.boxed(),
        };

        match self.sender.try_send(task) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(task)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(task = %task.name, "Task queue full, rejecting task");
                Err(QueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// The per-task time limit.
    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Cancels running and waiting tasks and waits for the workers to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = std::mem::take(&mut *self.workers.lock());
        if handles.is_empty() {
            return;
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Task worker ended abnormally");
            }
        }
        info!("Task queue shut down");
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("task_timeout", &self.task_timeout)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

struct Worker {
    id: usize,
    receiver: SharedReceiver,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    task_timeout: Duration,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                task = async { self.receiver.lock().await.recv().await } => task,
            };
            let Some(task) = next else { break };

            let span = tracing::debug_span!("task", worker = self.id, name = %task.name);
            let keep_going = self.execute(task.future).instrument(span).await;
            if !keep_going {
                break;
            }
        }
        debug!(worker = self.id, "Task worker stopped");
    }

    /// Returns `false` when the task was interrupted by shutdown.
    async fn execute(&self, future: BoxFuture<'static, ()>) -> bool {
        let guarded = tokio::time::timeout(self.task_timeout, AssertUnwindSafe(future).catch_unwind());

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Task cancelled by shutdown");
                false
            }
            outcome = guarded => {
                match outcome {
                    Ok(Ok(())) => {
                        self.counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(payload)) => {
                        self.counters.panicked.fetch_add(1, Ordering::Relaxed);
                        error!(panic = %panic_text(&*payload), "Task panicked");
                    }
                    Err(_) => {
                        self.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                        warn!(timeout_ms = self.task_timeout.as_millis() as u64, "Task timed out");
                    }
                }
                true
            }
        }
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
