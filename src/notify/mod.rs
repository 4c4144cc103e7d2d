//! Execution contexts for channel notifications.
//!
//! Channels never call into a select engine directly. They hand a
//! `Notification` to the `Notifier` they were given at registration time,
//! which decides which thread runs it.

/// Thread-pool backed notifier.
pub mod pool;

pub use pool::{NotifierPool, NotifierPoolConfig};

use crate::error::FlowResult;

/// A unit of notification work.
pub type Notification = Box<dyn FnOnce() + Send + 'static>;

/// Runs notifications on behalf of channels.
pub trait Notifier: Send + Sync {
    /// Schedules `job`.
    ///
    /// Channels call this after releasing their own lock, but the caller may
    /// still hold another engine's lock (see [`InlineNotifier`]).
    ///
    /// # Errors
    ///
    /// Returns an `ExecutionError` if the job could not be accepted, for
    /// example `QueueFull` from a bounded pool. The job is dropped unrun.
    fn dispatch(&self, job: Notification) -> FlowResult<()>;
}

/// Runs every notification synchronously on the thread that produced it.
///
/// A bind or push then runs [`SelectEngine::notify`] on the producing thread.
/// If that thread is inside another engine's `on_resolved`, it already holds
/// that engine's lock and now takes a second one. Two engines whose
/// `on_resolved` callbacks feed each other's channels take the locks in
/// opposite order and deadlock. Only use `InlineNotifier` when no
/// `on_resolved` binds or pushes into a channel watched by another
/// inline-notified engine; use `NotifierPool` otherwise.
///
/// [`SelectEngine::notify`]: crate::engine::SelectEngine::notify
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineNotifier;

impl Notifier for InlineNotifier {
    fn dispatch(&self, job: Notification) -> FlowResult<()> {
        job();
        Ok(())
    }
}
