//! # flowselect - guarded select over dataflow channels
//!
//! flowselect lets a consumer atomically take the next available value from
//! whichever of several input channels is ready first. Inputs are either
//! single-assignment variables (bound once, readable forever) or unbounded
//! streams (destructive dequeue).
//!
//! ## Core Concepts
//!
//! - **SelectEngine**: owns the channel set and parked requests; resolves a
//!   request from a ready channel or parks it until a channel notifies
//! - **Mask**: a per-request guard restricting which channel indices match
//! - **SelectRequest**: a guard plus a one-shot completion callback
//! - **Notifier**: the execution context channels use to deliver notifications
//! - **Select**: blocking, promise and channel-delivery select on top of the engine
//!
//! A single-assignment variable is delivered at most once per engine; after
//! that its index is disabled for that engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flowselect::{DataflowQueue, DataflowVariable, InlineNotifier, Mask, Select, SelectableChannel};
//!
//! let prices = Arc::new(DataflowQueue::new());
//! let done = Arc::new(DataflowVariable::new());
//! let select = Select::new(
//!     vec![
//!         Arc::clone(&prices) as Arc<dyn SelectableChannel<u64>>,
//!         Arc::clone(&done) as Arc<dyn SelectableChannel<u64>>,
//!     ],
//!     Arc::new(InlineNotifier),
//! );
//!
//! prices.push(42);
//! let result = select.priority_select()?;
//! assert_eq!((result.index, result.value), (0, 42));
//!
//! // Only listen to `done`.
//! done.bind(0)?;
//! let result = select.select_with(Mask::only(&[1], 2)?)?;
//! assert_eq!(result.index, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channel;
pub mod engine;
pub mod error;
pub mod guard;
pub mod notify;
pub mod select;

// Re-export primary types at crate root for convenience
pub use channel::{timeout_channel, ChannelKind, DataflowQueue, DataflowVariable, SelectableChannel};
pub use engine::{EngineId, SelectCallback, SelectEngine};
pub use error::{ChannelError, ExecutionError, FlowError, FlowResult, GuardError};
pub use guard::{GuardedRequest, Mask, SelectRequest, StartIndex};
pub use notify::{InlineNotifier, Notification, Notifier, NotifierPool, NotifierPoolConfig};
pub use select::{Select, SelectPromise, SelectResult};
