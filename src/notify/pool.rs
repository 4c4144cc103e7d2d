//! Fixed-size worker pool for notification delivery.

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ExecutionError, FlowError, FlowResult};

use super::{Notification, Notifier};

/// Notifier pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierPoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued notifications. `None` means unbounded.
    pub queue_capacity: Option<usize>,
}

impl Default for NotifierPoolConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: None,
        }
    }
}

impl NotifierPoolConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::Config` if `json` is malformed or a field has the
    /// wrong type.
    pub fn from_json(json: &str) -> FlowResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| FlowError::config(format!("invalid notifier pool config: {e}")))
    }
}

/// A notifier that runs notifications on dedicated worker threads.
///
/// Dropping the pool closes the queue; workers drain what is already queued
/// and exit, and the drop joins them.
pub struct NotifierPool {
    tx: Sender<Notification>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: Option<usize>,
}

impl NotifierPool {
    /// Starts the worker threads. A worker count of zero starts one worker,
    /// and a zero queue capacity is raised to one.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Spawn` if a worker thread cannot be spawned.
    /// Workers spawned before the failure exit on their own.
    pub fn start(config: &NotifierPoolConfig) -> FlowResult<Self> {
        let workers = config.workers.max(1);
        let queue_capacity = config.queue_capacity.map(|c| c.max(1));
        let (tx, rx) = match queue_capacity {
            Some(capacity) => bounded::<Notification>(capacity),
            None => unbounded::<Notification>(),
        };

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Notification> = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("flowselect-notify-{idx}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        // A panicking job must not take the worker down with it.
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            warn!(worker = idx, "notification panicked");
                        }
                    }
                })
                .map_err(|e| ExecutionError::Spawn {
                    message: e.to_string(),
                })?;
            handles.push(handle);
        }
        debug!(workers, ?queue_capacity, "notifier pool started");

        Ok(Self {
            tx,
            workers: handles,
            queue_capacity,
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

impl Notifier for NotifierPool {
    fn dispatch(&self, job: Notification) -> FlowResult<()> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                capacity: self.queue_capacity.unwrap_or(0),
            }
            .into()),
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected {
                path: "notifier_pool".to_string(),
            }
            .into()),
        }
    }
}

impl std::fmt::Debug for NotifierPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierPool")
            .field("workers", &self.workers.len())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

impl Drop for NotifierPool {
    fn drop(&mut self) {
        // Close the queue so workers exit once it is drained, then join.
        let (closed, _) = bounded::<Notification>(1);
        drop(std::mem::replace(&mut self.tx, closed));
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            // The last reference may be released from inside a job.
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }
}
