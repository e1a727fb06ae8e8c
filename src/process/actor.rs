use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::ActorContext;
use crate::error::ActorError;
use crate::message::Envelope;

/// The receive capability every actor implements.
///
/// # Concurrency
/// The runtime never calls `receive` on the same actor twice at once, so `&mut self` state
/// needs no locking. Handlers should return quickly; long work belongs in a spawned task
/// that answers through [`ActorContext::respond_to`].
///
/// # Failure
/// Returning `Err` (or panicking) reports the error to the error handlers, faults the
/// request's future and discards the message. It is never retried.
///
/// # Example
/// ```ignore
/// #[derive(Default)]
/// struct Counter { total: i64 }
///
/// #[async_trait]
/// impl Actor for Counter {
///     async fn receive(&mut self, ctx: &ActorContext, env: Envelope) -> Result<(), ActorError> {
///         self.total += env.data_as::<i64>()?;
///         ctx.respond_to(&env, self.total);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Actor: Send + 'static {
    async fn receive(&mut self, ctx: &ActorContext, envelope: Envelope) -> Result<(), ActorError>;

    /// Called once when the owning process is disposed.
    async fn on_dispose(&mut self, _ctx: &ActorContext) -> Result<(), ActorError> {
        Ok(())
    }
}

/// A plain receive function. Identity (pointer equality) distinguishes registrations.
pub type ReceiveFn =
    Arc<dyn Fn(ActorContext, Envelope) -> BoxFuture<'static, Result<(), ActorError>> + Send + Sync>;

/// Wraps an async closure as a [`ReceiveFn`].
pub fn receive_fn<F, Fut>(f: F) -> ReceiveFn
where
    F: Fn(ActorContext, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ActorError>> + Send + 'static,
{
    Arc::new(move |ctx, envelope| Box::pin(f(ctx, envelope)))
}

/// Which variant backs a process. Re-registering a name with another kind is a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Class,
    Function,
    Remote,
}

impl std::fmt::Display for ActorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorKind::Class => write!(f, "class actor"),
            ActorKind::Function => write!(f, "function actor"),
            ActorKind::Remote => write!(f, "remote proxy"),
        }
    }
}
