//! Selectable input channels.
//!
//! The engine only needs two things from a channel: a non-blocking `poll` and
//! a way to be told when new data shows up. `DataflowVariable` and
//! `DataflowQueue` are in-memory implementations of the two channel kinds.

/// Unbounded stream channel.
pub mod queue;
/// Timer-bound variables.
pub mod timeout;
/// Single-assignment channel.
pub mod variable;

pub use queue::DataflowQueue;
pub use timeout::timeout_channel;
pub use variable::DataflowVariable;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::SelectCallback;
use crate::notify::Notifier;

/// How a channel behaves when polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Destructive dequeue; may yield many values over time.
    Stream,
    /// Binds once, then returns the same value forever.
    SingleAssignment,
}

impl ChannelKind {
    /// True for single-assignment channels.
    #[must_use]
    pub const fn is_single_assignment(self) -> bool {
        matches!(self, Self::SingleAssignment)
    }
}

/// A channel a select engine can read from.
///
/// Implementations must not hold their own lock while dispatching a
/// notification: the engine polls channels while holding its lock, and the
/// notification path takes the engine lock.
pub trait SelectableChannel<T>: Send + Sync {
    /// The channel kind. Must not change over the channel's lifetime.
    fn kind(&self) -> ChannelKind;

    /// Non-blocking read. Streams dequeue; bound single-assignment channels
    /// return their value every time.
    fn poll(&self) -> Option<T>;

    /// Registers `callback` to be run through `notifier` whenever new data
    /// becomes available.
    fn on_bound(&self, notifier: &Arc<dyn Notifier>, callback: SelectCallback<T>);
}

/// A registered callback together with the context that runs it.
pub(crate) struct Listener<T> {
    notifier: Arc<dyn Notifier>,
    callback: SelectCallback<T>,
}

impl<T: Send + 'static> Listener<T> {
    pub(crate) fn new(notifier: &Arc<dyn Notifier>, callback: SelectCallback<T>) -> Self {
        Self {
            notifier: Arc::clone(notifier),
            callback,
        }
    }

    pub(crate) fn fire(&self) {
        let callback = self.callback.clone();
        let index = callback.index();
        if let Err(err) = self.notifier.dispatch(Box::new(move || callback.fire())) {
            warn!(index, %err, "dropped channel notification");
        }
    }
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            notifier: Arc::clone(&self.notifier),
            callback: self.callback.clone(),
        }
    }
}
