use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use super::{FutureState, MessageKind};
use crate::address::Aid;
use crate::error::ActorError;
use crate::future::FutureHandle;
use crate::wire::MessageId;

/// Message headers. Ordered so encoded frames are deterministic.
pub type Header = BTreeMap<String, String>;

/// What a caller hands to `send`/`request`; becomes an [`Envelope`] once enqueued.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub(crate) data: Value,
    pub(crate) header: Header,
    pub(crate) timeout: Option<Duration>,
    pub(crate) response_type: Option<String>,
    pub(crate) from: Option<Aid>,
}

impl Message {
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Builds a message from any serializable payload.
    pub fn encode<T: Serialize>(payload: &T) -> Result<Self, ActorError> {
        let data = serde_json::to_value(payload).map_err(|e| ActorError::Serialization(e.to_string()))?;
        Ok(Self::new(data))
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    pub fn with_headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.header
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Messages still queued after this long are never delivered.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Hint naming the payload type the requester expects back.
    pub fn with_response_type(mut self, tag: impl Into<String>) -> Self {
        self.response_type = Some(tag.into());
        self
    }

    pub fn with_sender(mut self, from: Aid) -> Self {
        self.from = Some(from);
        self
    }
}

/// An immutable message plus its metadata, as seen by a receive handler.
///
/// Cloning is cheap; clones share the sticky expiry flag.
#[derive(Clone)]
pub struct Envelope {
    inner: Arc<EnvelopeInner>,
}

struct EnvelopeInner {
    id: MessageId,
    kind: MessageKind,
    data: Value,
    header: Header,
    from: Aid,
    created_at: Instant,
    timeout: Option<Duration>,
    expired: Arc<AtomicBool>,
    state: FutureState,
    response_type: Option<String>,
    error: Option<String>,
    future: Option<FutureHandle>,
}

#[derive(Default)]
pub(crate) struct EnvelopeParts {
    pub id: MessageId,
    pub kind: MessageKind,
    pub data: Value,
    pub header: Header,
    pub from: Aid,
    pub timeout: Option<Duration>,
    pub expired: Option<Arc<AtomicBool>>,
    pub state: FutureState,
    pub response_type: Option<String>,
    pub error: Option<String>,
    pub future: Option<FutureHandle>,
}

impl Envelope {
    pub(crate) fn from_parts(parts: EnvelopeParts) -> Self {
        Self {
            inner: Arc::new(EnvelopeInner {
                id: parts.id,
                kind: parts.kind,
                data: parts.data,
                header: parts.header,
                from: parts.from,
                created_at: Instant::now(),
                timeout: parts.timeout,
                expired: parts.expired.unwrap_or_default(),
                state: parts.state,
                response_type: parts.response_type,
                error: parts.error,
                future: parts.future,
            }),
        }
    }

    pub(crate) fn from_message(
        message: Message,
        kind: MessageKind,
        id: MessageId,
        timeout: Option<Duration>,
        expired: Arc<AtomicBool>,
        future: Option<FutureHandle>,
    ) -> Self {
        Self::from_parts(EnvelopeParts {
            id,
            kind,
            data: message.data,
            header: message.header,
            from: message.from.unwrap_or_default(),
            timeout,
            expired: Some(expired),
            response_type: message.response_type,
            future,
            ..Default::default()
        })
    }

    /// A completed response carrying `data`.
    pub fn reply(data: impl Into<Value>, from: Aid, id: MessageId) -> Self {
        Self::from_parts(EnvelopeParts {
            id,
            kind: MessageKind::FutureResponse,
            data: data.into(),
            from,
            state: FutureState::COMPLETED,
            ..Default::default()
        })
    }

    /// The response used when a handler returns without answering a request.
    pub fn empty_reply(from: Aid, id: MessageId) -> Self {
        Self::from_parts(EnvelopeParts {
            id,
            kind: MessageKind::FutureResponse,
            from,
            state: FutureState::COMPLETED | FutureState::EMPTY,
            ..Default::default()
        })
    }

    pub fn id(&self) -> MessageId {
        self.inner.id
    }

    pub fn kind(&self) -> MessageKind {
        self.inner.kind
    }

    pub fn data(&self) -> &Value {
        &self.inner.data
    }

    /// Decodes the untyped payload into the caller's type.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ActorError> {
        T::deserialize(&self.inner.data).map_err(|e| ActorError::Serialization(e.to_string()))
    }

    pub fn header(&self) -> &Header {
        &self.inner.header
    }

    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.inner.header.get(key).map(String::as_str)
    }

    pub fn from(&self) -> &Aid {
        &self.inner.from
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    pub fn created_at(&self) -> Instant {
        self.inner.created_at
    }

    /// True once the timeout has elapsed since creation. Sticky once observed.
    pub fn expired(&self) -> bool {
        if self.inner.expired.load(Ordering::Acquire) {
            return true;
        }
        match self.inner.timeout {
            Some(timeout) if !timeout.is_zero() && self.inner.created_at.elapsed() >= timeout => {
                self.inner.expired.store(true, Ordering::Release);
                true
            }
            _ => false,
        }
    }

    pub fn expire(&self) {
        self.inner.expired.store(true, Ordering::Release);
    }

    pub fn state(&self) -> FutureState {
        self.inner.state
    }

    /// True for the response synthesized when a handler ignored a request.
    pub fn is_empty_response(&self) -> bool {
        self.inner.state.contains(FutureState::EMPTY)
    }

    pub fn error_description(&self) -> Option<&str> {
        self.inner.error.as_deref()
    }

    pub fn response_type(&self) -> Option<&str> {
        self.inner.response_type.as_deref()
    }

    /// The completion handle of a `FutureRequest`.
    pub fn future(&self) -> Option<&FutureHandle> {
        self.inner.future.as_ref()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("from", &self.inner.from)
            .field("data", &self.inner.data)
            .field("header", &self.inner.header)
            .field("timeout", &self.inner.timeout)
            .field("state", &self.inner.state)
            .finish()
    }
}
