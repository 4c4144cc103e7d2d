use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::SelectCallback;
use crate::notify::Notifier;

use super::{ChannelKind, Listener, SelectableChannel};

struct QueueState<T> {
    items: VecDeque<T>,
    listeners: Vec<Listener<T>>,
}

/// An unbounded FIFO stream.
///
/// Every push notifies all registered listeners; `poll` dequeues.
pub struct DataflowQueue<T> {
    state: Mutex<QueueState<T>>,
}

impl<T> DataflowQueue<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                listeners: Vec::new(),
            }),
        }
    }

    /// Number of queued values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// True if no values are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + 'static> DataflowQueue<T> {
    /// Appends `value` and notifies every registered listener.
    pub fn push(&self, value: T) {
        let listeners = {
            let mut state = self.lock();
            state.items.push_back(value);
            state.listeners.clone()
        };
        for listener in &listeners {
            listener.fire();
        }
    }
}

impl<T> Default for DataflowQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DataflowQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("DataflowQueue")
            .field("len", &state.items.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl<T: Send + 'static> SelectableChannel<T> for DataflowQueue<T> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Stream
    }

    fn poll(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    fn on_bound(&self, notifier: &Arc<dyn Notifier>, callback: SelectCallback<T>) {
        self.lock().listeners.push(Listener::new(notifier, callback));
    }
}
