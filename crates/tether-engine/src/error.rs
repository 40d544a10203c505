//! Exceptions raised by native code running inside the engine.

use thiserror::Error;

/// An exception thrown by a native function, a promise rejection, or a host
/// callback that failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{name}: {message}")]
pub struct Exception {
    /// Error class name, e.g. `TypeError`
    pub name: String,
    /// Human-readable message
    pub message: String,
    /// Optional stack trace text
    pub stack: Option<String>,
}

impl Exception {
    /// Create an exception with an explicit name.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// A plain `Error`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    /// A `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    /// A `RangeError`.
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new("RangeError", message)
    }

    /// Attach stack text.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, Exception>;
