//! Unified error type for the padtap-lib crate.
//!
//! [`TapError`] wraps the module-specific [`PortError`] and domain-specific
//! error kinds (`Busy`, `Detached`, `Config`). `From` impls allow `?` to
//! propagate across module boundaries seamlessly.

use std::fmt;

use crate::port::PortError;

/// Unified error type for padtap-lib operations.
#[derive(Debug)]
pub enum TapError {
    /// The parallel port could not be claimed: another driver holds it.
    Busy,
    /// The adapter (or its context) is no longer registered.
    Detached,
    /// Parallel-port communication error (open, line I/O).
    Port(PortError),
    /// Standard I/O error (config read, thread spawn).
    Io(std::io::Error),
    /// Configuration validation or parse error.
    Config(String),
}

impl fmt::Display for TapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapError::Busy => write!(f, "Parallel port is busy"),
            TapError::Detached => write!(f, "Adapter is not registered"),
            TapError::Port(e) => write!(f, "{e}"),
            TapError::Io(e) => write!(f, "I/O error: {e}"),
            TapError::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for TapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TapError::Port(e) => Some(e),
            TapError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PortError> for TapError {
    fn from(e: PortError) -> Self {
        TapError::Port(e)
    }
}

impl From<std::io::Error> for TapError {
    fn from(e: std::io::Error) -> Self {
        TapError::Io(e)
    }
}

/// Crate-level Result alias using [`TapError`].
pub type Result<T> = std::result::Result<T, TapError>;
