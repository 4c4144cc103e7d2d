//! Caller-facing select operations.
//!
//! `Select` wraps a `SelectEngine` with the usual ways of consuming a result:
//! block the current thread, get a promise to wait on later, or have the
//! result pushed into a channel. Plain `select*` methods start the scan at a
//! random index; `priority_select*` methods always start at index 0, so lower
//! indices win when several channels are ready.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::channel::SelectableChannel;
use crate::engine::SelectEngine;
use crate::error::{ExecutionError, FlowError, FlowResult};
use crate::guard::{GuardedRequest, Mask, StartIndex};
use crate::notify::Notifier;

/// A selected value and the index of the channel it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectResult<T> {
    /// Channel index.
    pub index: usize,
    /// The value read from the channel.
    pub value: T,
}

/// Handle to a select that may not have resolved yet.
#[derive(Debug)]
pub struct SelectPromise<T> {
    rx: Receiver<SelectResult<T>>,
}

impl<T> SelectPromise<T> {
    /// Blocks until the select resolves.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Disconnected` if the request was dropped
    /// unresolved, which happens when its engine is dropped.
    pub fn wait(&self) -> FlowResult<SelectResult<T>> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Blocks until the select resolves or `timeout` elapses.
    ///
    /// A timeout does not withdraw the request; the promise can be waited on
    /// again and still receives the value later.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Timeout` if nothing arrived in time and
    /// `ExecutionError::Disconnected` if the request was dropped unresolved.
    pub fn wait_timeout(&self, timeout: Duration) -> FlowResult<SelectResult<T>> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => FlowError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }

    /// Returns the result if the select has already resolved.
    #[must_use]
    pub fn try_get(&self) -> Option<SelectResult<T>> {
        self.rx.try_recv().ok()
    }
}

fn disconnected() -> FlowError {
    FlowError::Execution(ExecutionError::Disconnected {
        path: "select_promise".to_string(),
    })
}

/// Select over a fixed set of channels.
pub struct Select<T> {
    engine: Arc<SelectEngine<T>>,
}

impl<T: Send + 'static> Select<T> {
    /// Builds a select over `channels`. Notifications run through `notifier`.
    pub fn new(channels: Vec<Arc<dyn SelectableChannel<T>>>, notifier: Arc<dyn Notifier>) -> Self {
        Self::from_engine(SelectEngine::new(channels, notifier))
    }

    /// Wraps an existing engine.
    #[must_use]
    pub fn from_engine(engine: Arc<SelectEngine<T>>) -> Self {
        Self { engine }
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<SelectEngine<T>> {
        &self.engine
    }

    /// Blocks until any channel yields a value. Random start.
    ///
    /// # Errors
    ///
    /// Same as [`Select::select_with`].
    pub fn select(&self) -> FlowResult<SelectResult<T>> {
        self.select_with(Mask::All)
    }

    /// Blocks until a channel allowed by `mask` yields a value. Random start.
    ///
    /// # Errors
    ///
    /// Fails with a `GuardError` if `mask` does not fit the channel set,
    /// with `ExecutionError::Poisoned` if the engine lock is poisoned, and
    /// with `ExecutionError::Disconnected` if the engine is dropped while the
    /// call is waiting.
    pub fn select_with(&self, mask: Mask) -> FlowResult<SelectResult<T>> {
        self.promise(StartIndex::Random, mask)?.wait()
    }

    /// Blocks until any channel yields a value, preferring lower indices.
    ///
    /// # Errors
    ///
    /// Same as [`Select::select_with`].
    pub fn priority_select(&self) -> FlowResult<SelectResult<T>> {
        self.priority_select_with(Mask::All)
    }

    /// Blocks until a channel allowed by `mask` yields a value, preferring
    /// lower indices.
    ///
    /// # Errors
    ///
    /// Same as [`Select::select_with`].
    pub fn priority_select_with(&self, mask: Mask) -> FlowResult<SelectResult<T>> {
        self.promise(StartIndex::At(0), mask)?.wait()
    }

    /// Starts a select with a random start and returns without blocking.
    ///
    /// # Errors
    ///
    /// Fails with a `GuardError` if `mask` does not fit the channel set, and
    /// with `ExecutionError::Poisoned` if the engine lock is poisoned.
    pub fn select_to_promise(&self, mask: Mask) -> FlowResult<SelectPromise<T>> {
        self.promise(StartIndex::Random, mask)
    }

    /// Starts a priority select and returns without blocking.
    ///
    /// # Errors
    ///
    /// Fails with a `GuardError` if `mask` does not fit the channel set, and
    /// with `ExecutionError::Poisoned` if the engine lock is poisoned.
    pub fn priority_select_to_promise(&self, mask: Mask) -> FlowResult<SelectPromise<T>> {
        self.promise(StartIndex::At(0), mask)
    }

    /// Starts a select with a random start whose result is sent to `sender`.
    ///
    /// Delivery uses `try_send` because it runs under the engine lock; a full
    /// or disconnected sender drops the result with a warning. Use an
    /// unbounded channel when results must not be lost.
    ///
    /// # Errors
    ///
    /// Fails with a `GuardError` if `mask` does not fit the channel set, and
    /// with `ExecutionError::Poisoned` if the engine lock is poisoned.
    pub fn select_to_sender(&self, sender: Sender<SelectResult<T>>, mask: Mask) -> FlowResult<()> {
        self.forward(StartIndex::Random, sender, mask)
    }

    /// Starts a priority select whose result is sent to `sender`.
    ///
    /// # Errors
    ///
    /// Fails with a `GuardError` if `mask` does not fit the channel set, and
    /// with `ExecutionError::Poisoned` if the engine lock is poisoned.
    pub fn priority_select_to_sender(&self, sender: Sender<SelectResult<T>>, mask: Mask) -> FlowResult<()> {
        self.forward(StartIndex::At(0), sender, mask)
    }

    fn promise(&self, start: StartIndex, mask: Mask) -> FlowResult<SelectPromise<T>> {
        let (tx, rx) = bounded::<SelectResult<T>>(1);
        self.engine.select(
            start,
            Box::new(GuardedRequest::new(mask, move |index, value| {
                // Capacity 1 and a single delivery: never full.
                let _ = tx.try_send(SelectResult { index, value });
            })),
        )?;
        Ok(SelectPromise { rx })
    }

    fn forward(&self, start: StartIndex, sender: Sender<SelectResult<T>>, mask: Mask) -> FlowResult<()> {
        let engine = self.engine.id();
        self.engine.select(
            start,
            Box::new(GuardedRequest::new(mask, move |index, value| {
                match sender.try_send(SelectResult { index, value }) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(%engine, index, "select result dropped: receiver full");
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        warn!(%engine, index, "select result dropped: receiver gone");
                    }
                }
            })),
        )
    }
}

impl<T> std::fmt::Debug for Select<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Select").field("engine", &self.engine).finish()
    }
}
