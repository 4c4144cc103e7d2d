use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::SelectCallback;
use crate::error::{ChannelError, FlowResult};
use crate::notify::Notifier;

use super::{ChannelKind, Listener, SelectableChannel};

struct VariableState<T> {
    value: Option<T>,
    listeners: Vec<Listener<T>>,
}

/// A single-assignment variable.
///
/// Binds at most once. Every registered callback fires once when the value
/// is bound; callbacks registered afterwards fire immediately.
pub struct DataflowVariable<T> {
    state: Mutex<VariableState<T>>,
}

impl<T> DataflowVariable<T> {
    /// Creates an unbound variable.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VariableState {
                value: None,
                listeners: Vec::new(),
            }),
        }
    }

    /// Creates a variable that is already bound to `value`.
    #[must_use]
    pub fn bound(value: T) -> Self {
        Self {
            state: Mutex::new(VariableState {
                value: Some(value),
                listeners: Vec::new(),
            }),
        }
    }

    /// True once a value has been bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.lock().value.is_some()
    }

    // No user code runs under this lock, so a poisoned guard still holds
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, VariableState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> DataflowVariable<T> {
    /// Binds the variable and notifies every registered listener.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::AlreadyBound` if a value was bound before.
    pub fn bind(&self, value: T) -> FlowResult<()> {
        let listeners = {
            let mut state = self.lock();
            if state.value.is_some() {
                return Err(ChannelError::AlreadyBound.into());
            }
            state.value = Some(value);
            std::mem::take(&mut state.listeners)
        };
        for listener in &listeners {
            listener.fire();
        }
        Ok(())
    }

    /// Non-blocking read of the bound value.
    #[must_use]
    pub fn get(&self) -> Option<T> {
        self.lock().value.clone()
    }
}

impl<T> Default for DataflowVariable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for DataflowVariable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("DataflowVariable")
            .field("value", &state.value)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl<T: Clone + Send + 'static> SelectableChannel<T> for DataflowVariable<T> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::SingleAssignment
    }

    fn poll(&self) -> Option<T> {
        self.get()
    }

    fn on_bound(&self, notifier: &Arc<dyn Notifier>, callback: SelectCallback<T>) {
        let listener = Listener::new(notifier, callback);
        {
            let mut state = self.lock();
            if state.value.is_none() {
                state.listeners.push(listener);
                return;
            }
        }
        listener.fire();
    }
}
