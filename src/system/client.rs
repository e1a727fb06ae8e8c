//! # ActorClient Trait
//!
//! Typed wrappers around a [`Pid`]: callers send and receive their own types while the
//! runtime carries untyped payloads.
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::address::Pid;
use crate::error::ActorError;
use crate::message::Message;

/// Trait for actor-specific clients to inherit typed `tell` and `ask`.
///
/// # Example
///
/// ```ignore
/// struct LedgerClient { pid: Pid }
///
/// #[async_trait]
/// impl ActorClient for LedgerClient {
///     type Error = LedgerError;
///
///     fn pid(&self) -> &Pid { &self.pid }
///
///     fn map_error(e: ActorError) -> LedgerError { LedgerError::Runtime(e.to_string()) }
/// }
///
/// let balance: i64 = client.ask(&Deposit { amount: 10 }).await?;
/// ```
#[async_trait]
pub trait ActorClient: Send + Sync {
    /// The actor-specific error type.
    type Error: Send;

    /// Address of the actor this client talks to.
    fn pid(&self) -> &Pid;

    /// Map runtime errors to the client's error type.
    fn map_error(e: ActorError) -> Self::Error;

    /// Fire-and-forget.
    fn tell<M: Serialize>(&self, message: &M) -> Result<(), Self::Error> {
        let message = Message::encode(message).map_err(Self::map_error)?;
        self.pid().send(message).map_err(Self::map_error)
    }

    /// Sends a request and decodes the response payload into `R`.
    #[tracing::instrument(skip(self, message), fields(actor = %self.pid()))]
    async fn ask<M, R>(&self, message: &M) -> Result<R, Self::Error>
    where
        M: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        tracing::debug!("Sending request");
        let message = Message::encode(message).map_err(Self::map_error)?;
        let future = self.pid().request(message).map_err(Self::map_error)?;
        let reply = future.await.map_err(|e| Self::map_error(e.into()))?;
        reply.data_as::<R>().map_err(Self::map_error)
    }
}
