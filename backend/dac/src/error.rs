//! DAC errors.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DacError {
    /// A configured rule line that cannot be used. Always recovered by
    /// dropping the line.
    #[error("rule '{line}' for {operation}: {reason}")]
    RuleSyntax {
        operation: String,
        line: String,
        reason: String,
    },

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// The attempted operation is denied and must not take effect.
    #[error("access denied: {operation} by {identity} on '{argument}'")]
    AccessDenied {
        operation: String,
        identity: String,
        argument: String,
    },
}

pub type Result<T> = std::result::Result<T, DacError>;
