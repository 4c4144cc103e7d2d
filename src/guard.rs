//! Guards and select requests.
//!
//! A select request couples a guard (`Mask`) with a one-shot completion
//! callback. The engine consults the guard for every index it is about to
//! poll and hands the value to the callback exactly once.

use serde::{Deserialize, Serialize};

use crate::error::{FlowResult, GuardError};

/// Per-request channel filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mask {
    /// Every channel index matches.
    #[default]
    All,
    /// Only indices flagged `true` match. The length must equal the number
    /// of channels in the engine.
    Subset(Vec<bool>),
}

impl Mask {
    /// Builds a subset mask of `width` entries with only `indices` enabled.
    ///
    /// # Errors
    ///
    /// Returns `MaskOutOfBounds` if any index is at or beyond `width`.
    pub fn only(indices: &[usize], width: usize) -> Result<Self, GuardError> {
        let mut flags = vec![false; width];
        for &index in indices {
            let flag = flags
                .get_mut(index)
                .ok_or(GuardError::MaskOutOfBounds { index, len: width })?;
            *flag = true;
        }
        Ok(Self::Subset(flags))
    }

    /// Builds a subset mask of `width` entries that excludes every index.
    #[must_use]
    pub fn none(width: usize) -> Self {
        Self::Subset(vec![false; width])
    }

    /// Returns whether `index` passes the guard.
    ///
    /// A subset mask that is too short for `index` is a configuration fault
    /// and reports `MaskOutOfBounds` instead of a silent `false`.
    ///
    /// # Errors
    ///
    /// Returns `MaskOutOfBounds` if a subset mask has no entry for `index`.
    pub fn matches(&self, index: usize) -> Result<bool, GuardError> {
        match self {
            Self::All => Ok(true),
            Self::Subset(flags) => flags
                .get(index)
                .copied()
                .ok_or(GuardError::MaskOutOfBounds {
                    index,
                    len: flags.len(),
                }),
        }
    }

    /// Rejects subset masks wider than the channel set.
    ///
    /// Narrower masks are caught by `matches` during the scan.
    ///
    /// # Errors
    ///
    /// Returns `WidthMismatch` if the mask has more entries than `channels`.
    pub fn check_width(&self, channels: usize) -> Result<(), GuardError> {
        match self {
            Self::Subset(flags) if flags.len() > channels => Err(GuardError::WidthMismatch {
                expected: channels,
                actual: flags.len(),
            }),
            _ => Ok(()),
        }
    }
}

impl From<Vec<bool>> for Mask {
    fn from(flags: Vec<bool>) -> Self {
        Self::Subset(flags)
    }
}

/// Where the engine starts its rotation scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartIndex {
    /// A uniformly random index, fresh for every call.
    #[default]
    Random,
    /// A concrete index, reduced modulo the number of channels.
    At(usize),
}

/// A consumer waiting for one value from an engine.
///
/// `on_resolved` runs while the engine lock is held. It must not block and
/// must not call back into the same engine.
pub trait SelectRequest<T>: Send {
    /// Returns whether this request accepts a value from channel `index`.
    fn matches(&self, index: usize) -> FlowResult<bool>;

    /// Validates the request against an engine of `channels` inputs before
    /// the scan starts.
    fn check_width(&self, channels: usize) -> FlowResult<()> {
        let _ = channels;
        Ok(())
    }

    /// Delivers the selected value. Consumes the request.
    fn on_resolved(self: Box<Self>, index: usize, value: T);
}

/// A `SelectRequest` made of a `Mask` and a closure.
pub struct GuardedRequest<F> {
    mask: Mask,
    on_resolved: F,
}

impl<F> GuardedRequest<F> {
    /// Creates a request that hands the selected `(index, value)` to `on_resolved`.
    pub fn new(mask: Mask, on_resolved: F) -> Self {
        Self { mask, on_resolved }
    }

    /// The guard captured at creation.
    #[must_use]
    pub const fn mask(&self) -> &Mask {
        &self.mask
    }
}

impl<F> std::fmt::Debug for GuardedRequest<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedRequest")
            .field("mask", &self.mask)
            .finish_non_exhaustive()
    }
}

impl<T, F> SelectRequest<T> for GuardedRequest<F>
where
    F: FnOnce(usize, T) + Send,
{
    fn matches(&self, index: usize) -> FlowResult<bool> {
        Ok(self.mask.matches(index)?)
    }

    fn check_width(&self, channels: usize) -> FlowResult<()> {
        Ok(self.mask.check_width(channels)?)
    }

    fn on_resolved(self: Box<Self>, index: usize, value: T) {
        (self.on_resolved)(index, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    #[test]
    fn all_mask_matches_everything() {
        let mask = Mask::All;
        assert!(mask.matches(0).unwrap());
        assert!(mask.matches(usize::MAX).unwrap());
        assert!(mask.check_width(0).is_ok());
    }

    #[test]
    fn subset_mask_filters_indices() {
        let mask = Mask::only(&[1, 3], 4).unwrap();
        assert_eq!(mask, Mask::Subset(vec![false, true, false, true]));
        assert!(!mask.matches(0).unwrap());
        assert!(mask.matches(1).unwrap());
        assert!(mask.matches(3).unwrap());
    }

    #[test]
    fn only_rejects_indices_past_width() {
        let err = Mask::only(&[5], 3).unwrap_err();
        assert_eq!(err, GuardError::MaskOutOfBounds { index: 5, len: 3 });
        assert!(Mask::only(&[0, 3], 3).is_err());
        assert_eq!(Mask::only(&[], 2).unwrap(), Mask::none(2));
    }

    #[test]
    fn short_mask_is_a_fault_not_a_false() {
        let mask = Mask::Subset(vec![true, true]);
        let err = mask.matches(2).unwrap_err();
        assert_eq!(err, GuardError::MaskOutOfBounds { index: 2, len: 2 });
    }

    #[test]
    fn wide_mask_fails_width_check() {
        let mask = Mask::none(5);
        let err = mask.check_width(3).unwrap_err();
        assert_eq!(err, GuardError::WidthMismatch { expected: 3, actual: 5 });
        assert!(mask.check_width(5).is_ok());
        // Narrow masks pass here and fail in `matches`.
        assert!(mask.check_width(8).is_ok());
    }

    #[test]
    fn guarded_request_delivers_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let request: Box<dyn SelectRequest<&'static str>> =
            Box::new(GuardedRequest::new(Mask::only(&[1], 2).unwrap(), move |index: usize, value: &'static str| {
                sink.lock().unwrap().push((index, value));
            }));

        assert!(!request.matches(0).unwrap());
        assert!(request.matches(1).unwrap());
        let err = request.matches(2).unwrap_err();
        assert!(err.is_guard());

        request.on_resolved(1, "x");
        assert_eq!(*seen.lock().unwrap(), vec![(1, "x")]);
    }
}
