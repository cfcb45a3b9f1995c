use miette::Diagnostic;
use thiserror::Error;

/// Result type for structuring operations
pub type Result<T> = std::result::Result<T, Error>;

/// Custom error types for the control-flow structuring core
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum Error {
    /// Cooperative abort requested through a [`crate::CancellationToken`].
    ///
    /// This is an expected, recoverable outcome: the caller discards the
    /// partially rewritten method wholesale and may retry from scratch.
    #[error("decompilation aborted")]
    #[diagnostic(code(cil_dec::cancelled))]
    Cancelled,

    #[error("control flow structuring failed: {message}")]
    #[diagnostic(code(cil_dec::structuring_error))]
    Structuring { message: String },

    #[error("internal error: {message}")]
    #[diagnostic(code(cil_dec::internal_error))]
    Internal { message: String },
}

impl Error {
    /// Create a structuring error
    pub fn structuring(message: impl Into<String>) -> Self {
        Error::Structuring {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// True if this error is the cooperative-abort outcome.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
