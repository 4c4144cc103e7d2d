//! Bridge from a channel's own notification to its select engine.

use std::fmt;
use std::sync::Weak;

use super::SelectEngine;

/// Per-(engine, channel index) notification hook.
///
/// Installed once per channel when the engine is built. Holds the engine
/// weakly so channels never keep an engine alive; once the engine is gone
/// firing the callback does nothing.
pub struct SelectCallback<T> {
    engine: Weak<SelectEngine<T>>,
    index: usize,
}

impl<T> SelectCallback<T> {
    pub(crate) fn new(engine: Weak<SelectEngine<T>>, index: usize) -> Self {
        Self { engine, index }
    }

    /// The channel index this callback reports.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl<T: Send + 'static> SelectCallback<T> {
    /// Tells the engine that channel `index` may have data.
    ///
    /// A failed notification (poisoned engine lock) is dropped without retry.
    /// A later `select` rescans every channel, so a bound single-assignment
    /// variable is still found; a stream whose only wakeup was lost stays
    /// unnoticed until its next push.
    pub fn fire(&self) {
        if let Some(engine) = self.engine.upgrade() {
            let _ = engine.notify(self.index);
        }
    }
}

impl<T> Clone for SelectCallback<T> {
    fn clone(&self) -> Self {
        Self {
            engine: Weak::clone(&self.engine),
            index: self.index,
        }
    }
}

impl<T> fmt::Debug for SelectCallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectCallback")
            .field("index", &self.index)
            .field("engine_alive", &(self.engine.strong_count() > 0))
            .finish()
    }
}
