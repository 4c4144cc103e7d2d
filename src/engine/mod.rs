//! The guarded select engine.
//!
//! A `SelectEngine` owns a fixed list of input channels, one disabled flag per
//! channel and a FIFO queue of parked requests. Two paths mutate that state,
//! both under a single mutex:
//!
//! - `select` scans the channels in rotation order starting at the requested
//!   index and resolves the request with the first ready, guard-matching,
//!   non-disabled channel. If nothing is ready the request is parked.
//! - `notify` runs when a channel reports new data and hands that channel's
//!   value to the oldest parked request that wants it.
//!
//! Because the scan and the registration happen in one critical section, a
//! notification can never slip in between them and be lost.
//!
//! Single-assignment channels are consumed once per engine: after their value
//! has been delivered the index is disabled and never polled again by this
//! engine.

mod callback;

pub use callback::SelectCallback;

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::channel::SelectableChannel;
use crate::error::{FlowError, FlowResult};
use crate::guard::{SelectRequest, StartIndex};
use crate::notify::Notifier;

/// Unique identifier of an engine instance, attached to log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineId(pub Uuid);

impl EngineId {
    /// Generates a new random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EngineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct PendingRequest<T> {
    seq: u64,
    request: Box<dyn SelectRequest<T>>,
}

struct EngineState<T> {
    channels: Vec<Arc<dyn SelectableChannel<T>>>,
    disabled: Vec<bool>,
    pending: VecDeque<PendingRequest<T>>,
    next_seq: u64,
}

/// Selects values from a fixed set of channels.
pub struct SelectEngine<T> {
    id: EngineId,
    width: usize,
    state: Mutex<EngineState<T>>,
}

impl<T: Send + 'static> SelectEngine<T> {
    /// Builds an engine over `channels` and installs one `SelectCallback` per
    /// channel through `notifier`.
    ///
    /// Channel order defines the indices reported to requests.
    pub fn new(channels: Vec<Arc<dyn SelectableChannel<T>>>, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        let width = channels.len();
        let hooks = channels.clone();
        let engine = Arc::new(Self {
            id: EngineId::new(),
            width,
            state: Mutex::new(EngineState {
                channels,
                disabled: vec![false; width],
                pending: VecDeque::new(),
                next_seq: 0,
            }),
        });

        // The engine lock is free here, so channels may fire immediately.
        for (index, channel) in hooks.iter().enumerate() {
            channel.on_bound(&notifier, SelectCallback::new(Arc::downgrade(&engine), index));
        }
        debug!(engine = %engine.id, channels = width, "select engine created");

        engine
    }

    /// Resolves `request` with a ready channel or parks it until one is.
    ///
    /// The scan visits every index once in rotation order from `start` and
    /// stops at the first guard-matching, non-disabled channel whose `poll`
    /// yields a value. When nothing is ready the request joins the back of the
    /// pending queue and `notify` resolves it later. There is no way to
    /// withdraw a parked request.
    ///
    /// # Errors
    ///
    /// Returns a guard error if the request's mask does not fit this engine,
    /// and `ExecutionError::Poisoned` if a previous callback panicked while
    /// holding the engine lock. In both cases the request is dropped unresolved.
    pub fn select(&self, start: StartIndex, request: Box<dyn SelectRequest<T>>) -> FlowResult<()> {
        let mut guard = self.lock_state()?;
        let state = &mut *guard;
        let width = state.channels.len();

        request.check_width(width)?;

        if width > 0 {
            let base = match start {
                StartIndex::At(i) => i % width,
                StartIndex::Random => rand::thread_rng().gen_range(0..width),
            };

            for offset in 0..width {
                let idx = (base + offset) % width;
                if !request.matches(idx)? || state.disabled[idx] {
                    continue;
                }
                let channel = &state.channels[idx];
                let Some(value) = channel.poll() else {
                    continue;
                };
                if channel.kind().is_single_assignment() {
                    state.disabled[idx] = true;
                }
                debug!(engine = %self.id, index = idx, base, "select resolved from scan");
                request.on_resolved(idx, value);
                return Ok(());
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push_back(PendingRequest { seq, request });
        trace!(engine = %self.id, seq, pending = state.pending.len(), "select parked");
        Ok(())
    }

    /// Offers channel `index` to the parked requests.
    ///
    /// The oldest parked request that matches `index` receives the value, if
    /// the channel still has one. Spurious or late notifications are no-ops,
    /// as are indices outside the channel set.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Poisoned` if the engine lock is poisoned.
    pub fn notify(&self, index: usize) -> FlowResult<()> {
        let mut guard = self.lock_state()?;
        let state = &mut *guard;

        if index >= state.channels.len() || state.disabled[index] {
            return Ok(());
        }

        let mut wanted = None;
        for (pos, pending) in state.pending.iter().enumerate() {
            match pending.request.matches(index) {
                Ok(true) => {
                    wanted = Some(pos);
                    break;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(engine = %self.id, seq = pending.seq, index, %err, "skipping request with faulty guard");
                }
            }
        }
        let Some(pos) = wanted else {
            trace!(engine = %self.id, index, "no parked request wants channel");
            return Ok(());
        };

        let channel = &state.channels[index];
        let Some(value) = channel.poll() else {
            trace!(engine = %self.id, index, "channel already drained");
            return Ok(());
        };
        if channel.kind().is_single_assignment() {
            state.disabled[index] = true;
        }
        if let Some(pending) = state.pending.remove(pos) {
            debug!(engine = %self.id, index, seq = pending.seq, "parked select resolved");
            pending.request.on_resolved(index, value);
        }
        Ok(())
    }

    /// Number of parked requests.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Poisoned` if a request callback panicked
    /// while holding the engine lock.
    pub fn pending_len(&self) -> FlowResult<usize> {
        Ok(self.lock_state()?.pending.len())
    }

    /// Whether `index` has been consumed by this engine. Out-of-range
    /// indices report `false`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Poisoned` if the engine lock is poisoned.
    pub fn is_disabled(&self, index: usize) -> FlowResult<bool> {
        Ok(self.lock_state()?.disabled.get(index).copied().unwrap_or(false))
    }
}

impl<T> SelectEngine<T> {
    /// The engine id used in log records.
    #[must_use]
    pub const fn id(&self) -> EngineId {
        self.id
    }

    /// Number of input channels.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.width
    }

    /// True if the engine has no input channels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0
    }

    fn lock_state(&self) -> FlowResult<MutexGuard<'_, EngineState<T>>> {
        self.state
            .lock()
            .map_err(|_| FlowError::poisoned("select engine"))
    }
}

impl<T> fmt::Debug for SelectEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectEngine")
            .field("id", &self.id)
            .field("channels", &self.width)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex as StdMutex;
    use std::thread;

    use crate::channel::{DataflowQueue, DataflowVariable};
    use crate::error::{ExecutionError, GuardError};
    use crate::guard::{GuardedRequest, Mask};
    use crate::notify::InlineNotifier;

    type Log = Arc<StdMutex<Vec<(usize, &'static str)>>>;

    fn recording(mask: Mask, log: &Log) -> Box<dyn SelectRequest<&'static str>> {
        let log = Arc::clone(log);
        Box::new(GuardedRequest::new(mask, move |index, value| {
            log.lock().unwrap().push((index, value));
        }))
    }

    fn inline() -> Arc<dyn Notifier> {
        Arc::new(InlineNotifier)
    }

    /// [A(empty), B("x"), C("z")] as variables.
    fn abc() -> Vec<Arc<dyn SelectableChannel<&'static str>>> {
        vec![
            Arc::new(DataflowVariable::<&'static str>::new()) as Arc<dyn SelectableChannel<&'static str>>,
            Arc::new(DataflowVariable::bound("x")),
            Arc::new(DataflowVariable::bound("z")),
        ]
    }

    #[test]
    fn scan_picks_nearest_ready_channel() {
        let engine = SelectEngine::new(abc(), inline());
        let log = Log::default();

        engine.select(StartIndex::At(0), recording(Mask::All, &log)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![(1, "x")]);
        assert!(engine.is_disabled(1).unwrap());
        assert!(!engine.is_disabled(2).unwrap());
    }

    #[test]
    fn scan_wraps_from_start_index() {
        let engine = SelectEngine::new(abc(), inline());
        let log = Log::default();

        engine.select(StartIndex::At(2), recording(Mask::All, &log)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![(2, "z")]);

        // Start index is reduced modulo the channel count.
        engine.select(StartIndex::At(5), recording(Mask::All, &log)).unwrap();
        assert_eq!(log.lock().unwrap()[1], (1, "x"));
    }

    #[test]
    fn single_assignment_is_consumed_once_per_engine() {
        let var = Arc::new(DataflowVariable::bound("v"));
        let engine = SelectEngine::new(
            vec![Arc::clone(&var) as Arc<dyn SelectableChannel<&'static str>>],
            inline(),
        );
        let log = Log::default();

        engine.select(StartIndex::At(0), recording(Mask::All, &log)).unwrap();
        engine.select(StartIndex::At(0), recording(Mask::All, &log)).unwrap();

        assert_eq!(*log.lock().unwrap(), vec![(0, "v")]);
        assert_eq!(engine.pending_len().unwrap(), 1);
        // The variable itself still holds its value.
        assert_eq!(var.get(), Some("v"));
    }

    #[test]
    fn excluded_request_stays_pending() {
        let q = Arc::new(DataflowQueue::<&'static str>::new());
        let v = Arc::new(DataflowVariable::<&'static str>::new());
        let engine = SelectEngine::new(
            vec![
                Arc::clone(&q) as Arc<dyn SelectableChannel<&'static str>>,
                Arc::clone(&v) as Arc<dyn SelectableChannel<&'static str>>,
            ],
            inline(),
        );
        let log = Log::default();

        engine.select(StartIndex::Random, recording(Mask::none(2), &log)).unwrap();
        q.push("a");
        q.push("b");
        v.bind("c").unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(engine.pending_len().unwrap(), 1);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn notify_serves_oldest_request_first() {
        let v = Arc::new(DataflowVariable::<&'static str>::new());
        let engine = SelectEngine::new(
            vec![Arc::clone(&v) as Arc<dyn SelectableChannel<&'static str>>],
            inline(),
        );
        let first = Log::default();
        let second = Log::default();

        engine.select(StartIndex::At(0), recording(Mask::All, &first)).unwrap();
        engine.select(StartIndex::At(0), recording(Mask::All, &second)).unwrap();
        v.bind("ready").unwrap();

        assert_eq!(*first.lock().unwrap(), vec![(0, "ready")]);
        assert!(second.lock().unwrap().is_empty());
        assert_eq!(engine.pending_len().unwrap(), 1);
    }

    #[test]
    fn notify_skips_requests_guarding_other_channels() {
        let q0 = Arc::new(DataflowQueue::<&'static str>::new());
        let q1 = Arc::new(DataflowQueue::<&'static str>::new());
        let engine = SelectEngine::new(
            vec![
                Arc::clone(&q0) as Arc<dyn SelectableChannel<&'static str>>,
                Arc::clone(&q1) as Arc<dyn SelectableChannel<&'static str>>,
            ],
            inline(),
        );
        let only0 = Log::default();
        let only1 = Log::default();

        engine.select(StartIndex::At(0), recording(Mask::only(&[0], 2).unwrap(), &only0)).unwrap();
        engine.select(StartIndex::At(0), recording(Mask::only(&[1], 2).unwrap(), &only1)).unwrap();
        q1.push("one");

        assert!(only0.lock().unwrap().is_empty());
        assert_eq!(*only1.lock().unwrap(), vec![(1, "one")]);
        assert_eq!(engine.pending_len().unwrap(), 1);
    }

    #[test]
    fn streams_are_never_disabled() {
        let q = Arc::new(DataflowQueue::<&'static str>::new());
        q.push("a");
        q.push("b");
        let engine = SelectEngine::new(
            vec![Arc::clone(&q) as Arc<dyn SelectableChannel<&'static str>>],
            inline(),
        );
        let log = Log::default();

        engine.select(StartIndex::At(0), recording(Mask::All, &log)).unwrap();
        engine.select(StartIndex::At(0), recording(Mask::All, &log)).unwrap();
        engine.select(StartIndex::At(0), recording(Mask::All, &log)).unwrap();
        assert!(!engine.is_disabled(0).unwrap());
        assert_eq!(engine.pending_len().unwrap(), 1);

        q.push("c");
        assert_eq!(*log.lock().unwrap(), vec![(0, "a"), (0, "b"), (0, "c")]);
        assert_eq!(engine.pending_len().unwrap(), 0);
    }

    #[test]
    fn short_mask_fails_on_matches() {
        let engine = SelectEngine::new(abc(), inline());
        let log = Log::default();

        // Index 0 is empty and 1 is excluded, so the scan reaches index 2.
        let err = engine
            .select(StartIndex::At(0), recording(Mask::Subset(vec![true, false]), &log))
            .unwrap_err();
        assert_eq!(err, FlowError::Guard(GuardError::MaskOutOfBounds { index: 2, len: 2 }));
        assert_eq!(engine.pending_len().unwrap(), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn wide_mask_is_rejected_before_scanning() {
        let engine = SelectEngine::new(abc(), inline());
        let log = Log::default();

        let err = engine
            .select(StartIndex::At(0), recording(Mask::Subset(vec![true; 4]), &log))
            .unwrap_err();
        assert_eq!(err, FlowError::Guard(GuardError::WidthMismatch { expected: 3, actual: 4 }));
        assert!(!engine.is_disabled(1).unwrap());
    }

    #[test]
    fn empty_engine_parks_every_request() {
        let engine = SelectEngine::<&'static str>::new(Vec::new(), inline());
        let log = Log::default();

        assert!(engine.is_empty());
        engine.select(StartIndex::Random, recording(Mask::All, &log)).unwrap();
        assert_eq!(engine.pending_len().unwrap(), 1);
        engine.notify(0).unwrap();
        assert_eq!(engine.pending_len().unwrap(), 1);
    }

    #[test]
    fn poisoned_engine_propagates_to_select() {
        let q = Arc::new(DataflowQueue::<&'static str>::new());
        q.push("boom");
        let engine = SelectEngine::new(
            vec![Arc::clone(&q) as Arc<dyn SelectableChannel<&'static str>>],
            inline(),
        );

        let worker = Arc::clone(&engine);
        let joined = thread::spawn(move || {
            let request: Box<dyn SelectRequest<&'static str>> =
                Box::new(GuardedRequest::new(Mask::All, |_: usize, _: &'static str| panic!("callback failed")));
            let _ = worker.select(StartIndex::At(0), request);
        })
        .join();
        assert!(joined.is_err());

        let log = Log::default();
        let err = engine.select(StartIndex::At(0), recording(Mask::All, &log)).unwrap_err();
        assert!(matches!(err, FlowError::Execution(ExecutionError::Poisoned { .. })));

        // The notification path swallows the same failure.
        q.push("later");
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn dropped_engine_ignores_notifications() {
        let v = Arc::new(DataflowVariable::<&'static str>::new());
        let engine = SelectEngine::new(
            vec![Arc::clone(&v) as Arc<dyn SelectableChannel<&'static str>>],
            inline(),
        );
        drop(engine);
        v.bind("late").unwrap();
        assert_eq!(v.get(), Some("late"));
    }
}
