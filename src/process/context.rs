use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::address::{Aid, Pid};
use crate::error::{ActorError, FutureError};
use crate::message::Envelope;

pub(crate) type ContextData = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// Per-actor state handed to every receive call.
///
/// Holds a keyed data store scoped to the actor and lets the handler complete the request
/// it is processing. Cloning shares the store.
#[derive(Clone)]
pub struct ActorContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    pid: Pid,
    data: RwLock<ContextData>,
}

impl ActorContext {
    pub(crate) fn new(pid: Pid, data: ContextData) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                pid,
                data: RwLock::new(data),
            }),
        }
    }

    pub fn pid(&self) -> &Pid {
        &self.inner.pid
    }

    pub fn aid(&self) -> &Aid {
        self.inner.pid.aid()
    }

    pub fn system_name(&self) -> &str {
        self.aid().system()
    }

    pub fn has_data(&self, key: &str) -> bool {
        self.inner.data.read().contains_key(key)
    }

    /// Fails with `NotFound` when the key is missing or holds another type.
    pub fn get_data<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, ActorError> {
        self.try_get_data(key)
            .ok_or_else(|| ActorError::NotFound(format!("context data '{key}'")))
    }

    pub fn try_get_data<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.inner.data.read().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set_data<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.inner.data.write().insert(key.into(), Arc::new(value));
    }

    pub fn remove_data(&self, key: &str) -> bool {
        self.inner.data.write().remove(key).is_some()
    }

    /// Completes the request carried by `envelope`. Returns `false` when there is no
    /// pending request to answer.
    pub fn respond_to(&self, envelope: &Envelope, data: impl Into<Value>) -> bool {
        match envelope.future() {
            Some(future) => future.respond(Envelope::reply(data, self.aid().clone(), envelope.id())),
            None => false,
        }
    }

    /// Like [`respond_to`](Self::respond_to) for any serializable reply.
    pub fn respond_to_with<T: Serialize>(&self, envelope: &Envelope, reply: &T) -> Result<bool, ActorError> {
        let data = serde_json::to_value(reply).map_err(|e| ActorError::Serialization(e.to_string()))?;
        Ok(self.respond_to(envelope, data))
    }

    pub fn respond_to_with_error(&self, envelope: &Envelope, error: impl fmt::Display) -> bool {
        match envelope.future() {
            Some(future) => future.respond_with_error(FutureError::Failed(error.to_string())),
            None => false,
        }
    }
}

impl fmt::Debug for ActorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.inner.data.read().keys().cloned().collect();
        keys.sort();
        f.debug_struct("ActorContext")
            .field("aid", self.aid())
            .field("data", &keys)
            .finish()
    }
}
