//! Error types for the Kestrel engine
//!
//! Every resource-creating operation returns [`Result`]. Errors are logged at
//! the point they are raised (see the `engine_err!` family of macros) and then
//! propagated to the caller, which decides whether to abort.

use std::fmt;

/// Result type for Kestrel engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Kestrel engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// A native graphics API call returned a non-success code
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (released handle, wrong buffer kind, malformed data)
    InvalidResource(String),

    /// Startup failed (no suitable device, missing extension or layer)
    InitializationFailed(String),

    /// The caller broke an API contract (draw outside a render pass,
    /// mutate a baked layout, draw without a camera)
    ContractViolation(String),

    /// File system failure, the message names the offending path
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::ContractViolation(msg) => write!(f, "Contract violation: {}", msg),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
