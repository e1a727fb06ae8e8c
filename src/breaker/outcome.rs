/// Result of a guarded call that never needs unwinding to signal rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome<T, E> {
    Success(T),
    /// The breaker was open; the call did not run.
    CircuitOpen,
    Failure(E),
}

impl<T, E> CallOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CallOutcome::CircuitOpen)
    }

    /// The `(result, success)` pair.
    pub fn into_parts(self) -> (Option<T>, bool) {
        match self {
            CallOutcome::Success(value) => (Some(value), true),
            CallOutcome::CircuitOpen | CallOutcome::Failure(_) => (None, false),
        }
    }

    pub fn into_result(self) -> Result<T, BreakerError<E>> {
        match self {
            CallOutcome::Success(value) => Ok(value),
            CallOutcome::CircuitOpen => Err(BreakerError::Open),
            CallOutcome::Failure(e) => Err(BreakerError::Failed(e)),
        }
    }
}

/// Keeps an open circuit distinct from the wrapped call's own failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakerError<E> {
    #[error("circuit is open")]
    Open,
    #[error("guarded call failed: {0}")]
    Failed(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open)
    }
}
