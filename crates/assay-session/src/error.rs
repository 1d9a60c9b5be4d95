//! Session error types.

use thiserror::Error;

/// Precondition violations. The only failures a session returns as `Err`.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("attempt on item '{0}' has not been initialized")]
    NotInitialized(String),

    #[error("test references item '{href}' which was not loaded")]
    MissingItem { href: String },

    #[error("no item '{0}' in the assembled test")]
    UnknownItem(String),
}

/// Why one submitted response could not be bound.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    #[error("'{0}' is not a declared response variable")]
    NotAResponse(String),

    #[error("'{0}' is maintained by the engine and cannot be bound")]
    Reserved(String),

    #[error("cannot bind '{identifier}': {reason}")]
    Parse { identifier: String, reason: String },
}
