//! # Runtime Errors
//!
//! This module defines the error types shared across the actor runtime. Each concern that
//! can fail on its own (wire framing, transports, circuit breakers) keeps its error enum
//! next to its code; everything converges on [`ActorError`] at the public API.

use crate::remote::TransportError;
use crate::wire::WireError;

/// Errors raised by the actor runtime itself.
///
/// Configuration errors (empty names, conflicting registrations, malformed addresses) are
/// returned synchronously from the call that introduced them. Handler failures are observed
/// by the scheduler and routed to error handlers instead of propagating to callers.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Name must not be empty: {0}")]
    EmptyName(&'static str),
    #[error("Actor {name} already exists with a different type ({existing})")]
    AlreadyExists { name: String, existing: String },
    #[error("Actor options for {0} carry no backing actor")]
    MissingBacking(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Port out of range: {0}")]
    PortOutOfRange(String),
    #[error("No tokio runtime available to schedule actors")]
    NoRuntime,
    #[error("Actor system disposed: {0}")]
    SystemDisposed(String),
    #[error("Process unavailable: {0}")]
    ProcessUnavailable(String),
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Handler failed: {0}")]
    Handler(String),
    #[error("Handler panicked: {0}")]
    HandlerPanic(String),
    #[error("No remote transport bound to system {0}")]
    NotBound(String),
    #[error("Dispose of {0} did not finish in time")]
    DisposeTimedOut(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Future(#[from] FutureError),
}

impl ActorError {
    /// Wraps any displayable failure as a handler error.
    pub fn handler(error: impl std::fmt::Display) -> Self {
        ActorError::Handler(error.to_string())
    }

    /// The fault a pending request resolves with when this error ends its handling.
    pub fn to_future_error(&self) -> FutureError {
        match self {
            ActorError::Handler(inner) => FutureError::Failed(inner.clone()),
            other => FutureError::Failed(other.to_string()),
        }
    }

    /// True for errors raised synchronously by setup calls.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ActorError::EmptyName(_)
                | ActorError::AlreadyExists { .. }
                | ActorError::MissingBacking(_)
                | ActorError::InvalidConfig(_)
                | ActorError::InvalidAddress(_)
                | ActorError::PortOutOfRange(_)
                | ActorError::NoRuntime
        )
    }
}

/// Terminal failure of a request future.
///
/// Cloneable so every waiter on the same future observes the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FutureError {
    #[error("Request canceled")]
    Canceled,
    #[error("Request timed out")]
    TimedOut,
    #[error("Request expired before delivery")]
    Expired,
    #[error("Handler failed: {0}")]
    Failed(String),
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Process disposed")]
    Disposed,
}

impl FutureError {
    /// True when the future ended through cancellation rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            FutureError::Canceled | FutureError::TimedOut | FutureError::Expired | FutureError::Disposed
        )
    }
}
