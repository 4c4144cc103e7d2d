//! Error types for flowselect.
//!
//! All errors are strongly typed using thiserror so callers can pattern match
//! on the specific condition. Value-level errors carried by channels are not
//! represented here; they travel through the select path as opaque payloads.

use thiserror::Error;

/// Guard configuration faults.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GuardError {
    #[error("Guard mask index {index} is out of bounds for a mask of length {len}")]
    MaskOutOfBounds {
        index: usize,
        len: usize,
    },

    #[error("Guard mask has {actual} entries but the engine has {expected} channels")]
    WidthMismatch {
        expected: usize,
        actual: usize,
    },
}

/// Errors raised while executing or waiting on a select.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Lock poisoned: {context}")]
    Poisoned {
        context: String,
    },

    #[error("Select timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Result channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Notifier queue is full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Failed to spawn notifier worker: {message}")]
    Spawn {
        message: String,
    },
}

/// Errors raised by the in-memory channel implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Dataflow variable is already bound")]
    AlreadyBound,
}

/// Top-level error type for flowselect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("Guard error: {0}")]
    Guard(#[from] GuardError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },
}

impl FlowError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a poisoned-lock error for the given context.
    #[must_use]
    pub fn poisoned(context: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::Poisoned {
            context: context.into(),
        })
    }

    /// Returns true if this is a guard configuration fault.
    #[must_use]
    pub const fn is_guard(&self) -> bool {
        matches!(self, Self::Guard(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a channel error.
    #[must_use]
    pub const fn is_channel(&self) -> bool {
        matches!(self, Self::Channel(_))
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Guard(_) | Self::Channel(_) | Self::Config { .. } => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. } | ExecutionError::QueueFull { .. }
            ),
        }
    }
}

/// Result type alias for flowselect operations.
pub type FlowResult<T> = Result<T, FlowError>;
