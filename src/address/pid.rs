use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;

use super::Aid;
use crate::error::ActorError;
use crate::future::FutureHandle;
use crate::message::{Envelope, Message};
use crate::process::{ActorKind, Process};

/// A locally resolvable actor handle.
///
/// Holds only a weak reference, so a `Pid` never keeps a disposed actor alive. Once the
/// process is gone the `Pid` degrades to a pure coordinate and every delivery fails with
/// [`ActorError::ProcessUnavailable`].
#[derive(Clone)]
pub struct Pid {
    aid: Aid,
    process: Weak<Process>,
}

impl Pid {
    pub(crate) fn new(aid: Aid, process: Weak<Process>) -> Self {
        Self { aid, process }
    }

    /// An address with no process behind it.
    pub fn coordinate(aid: Aid) -> Self {
        Self {
            aid,
            process: Weak::new(),
        }
    }

    pub fn aid(&self) -> &Aid {
        &self.aid
    }

    /// True when no live process backs this address.
    pub fn is_coordinate(&self) -> bool {
        self.live().is_none()
    }

    /// True for a live actor hosted in this process (not a remote proxy).
    pub fn is_local(&self) -> bool {
        self.live().is_some_and(|p| p.kind() != ActorKind::Remote)
    }

    fn live(&self) -> Option<Arc<Process>> {
        self.process.upgrade().filter(|p| !p.is_disposed())
    }

    fn process(&self) -> Result<Arc<Process>, ActorError> {
        self.process
            .upgrade()
            .ok_or_else(|| ActorError::ProcessUnavailable(self.aid.to_string()))
    }

    /// Fire-and-forget. `Ok` only acknowledges the enqueue.
    pub fn send(&self, message: Message) -> Result<(), ActorError> {
        self.process()?.send(message)
    }

    pub fn tell(&self, data: impl Into<Value>) -> Result<(), ActorError> {
        self.send(Message::new(data))
    }

    pub fn request(&self, message: Message) -> Result<FutureHandle, ActorError> {
        self.process()?.request(message)
    }

    pub fn request_with_timeout(&self, message: Message, timeout: Duration) -> Result<FutureHandle, ActorError> {
        self.request(message.with_timeout(timeout))
    }

    /// Requests and waits for the response envelope.
    pub async fn ask(&self, data: impl Into<Value>) -> Result<Envelope, ActorError> {
        let future = self.request(Message::new(data))?;
        Ok(future.await?)
    }
}

impl PartialEq for Pid {
    fn eq(&self, other: &Self) -> bool {
        self.aid == other.aid
    }
}

impl Eq for Pid {}

impl Hash for Pid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.aid.hash(state);
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.aid, f)
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pid")
            .field("aid", &self.aid)
            .field("coordinate", &self.is_coordinate())
            .finish()
    }
}
