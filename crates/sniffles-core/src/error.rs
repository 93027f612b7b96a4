//! Error types
//!
//! Two families live here:
//! - [`SimulatedFault`] / [`InterceptError`]: what an intercepted call can fail
//!   with. Simulated faults are raised deliberately by the fault policy and are
//!   distinguishable from each other and from real transport errors.
//! - [`SnifflesError`]: configuration and setup problems.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// A failure raised on purpose by the fault policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedFault {
    /// Generic connectivity failure
    #[error("Simulated network failure")]
    Network,

    /// Timeout, distinct from [`SimulatedFault::Network`]
    #[error("Simulated timeout")]
    Timeout,
}

impl SimulatedFault {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SimulatedFault::Timeout)
    }
}

impl From<SimulatedFault> for io::Error {
    fn from(fault: SimulatedFault) -> Self {
        let kind = match fault {
            SimulatedFault::Network => io::ErrorKind::ConnectionReset,
            SimulatedFault::Timeout => io::ErrorKind::TimedOut,
        };
        io::Error::new(kind, fault)
    }
}

/// Error returned by [`Sniffles::intercept`](crate::Sniffles::intercept)
///
/// Transport errors are carried as-is; the pipeline only observes them.
#[derive(Debug, Error)]
pub enum InterceptError<E> {
    #[error(transparent)]
    Simulated(SimulatedFault),

    #[error(transparent)]
    Transport(E),
}

impl<E> InterceptError<E> {
    /// The simulated fault, if this error was injected by policy
    pub fn simulated(&self) -> Option<SimulatedFault> {
        match self {
            InterceptError::Simulated(fault) => Some(*fault),
            InterceptError::Transport(_) => None,
        }
    }

    /// Unwrap the original transport error, if there is one
    pub fn into_transport(self) -> Option<E> {
        match self {
            InterceptError::Transport(err) => Some(err),
            InterceptError::Simulated(_) => None,
        }
    }
}

/// Setup and configuration errors
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SnifflesError {
    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SnifflesError>;

impl From<io::Error> for SnifflesError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SnifflesError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<SnifflesError> for String {
    fn from(err: SnifflesError) -> String {
        err.to_string()
    }
}
