use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{MessageId, Serializer, WireError, MESSAGE_ID_SIZE};
use crate::address::{Aid, RemoteAddress};
use crate::error::FutureError;
use crate::future::{FutureHandle, FutureOutcome};
use crate::message::{Envelope, EnvelopeParts, FutureState, Header, MessageKind};

/// Size of the length prefix in front of every frame.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Fixed header after the length prefix:
/// 1 (data type) + 1 (kind) + 1 (state) + 4 (timeout ms) + 20 (id) = 27 bytes.
pub const HEADER_SIZE: usize = 3 + 4 + MESSAGE_ID_SIZE;

/// Frames larger than this are rejected (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// What the payload of a frame holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataType {
    /// No payload; receivers ignore these.
    Empty = 0,
    Envelope = 1,
    /// Best-effort cancellation of the in-flight request with the frame's id.
    Cancel = 2,
}

impl TryFrom<u8> for DataType {
    type Error = WireError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(DataType::Empty),
            1 => Ok(DataType::Envelope),
            2 => Ok(DataType::Cancel),
            other => Err(WireError::UnknownDataType(other)),
        }
    }
}

/// Frame header fields, decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub data_type: DataType,
    pub kind: MessageKind,
    pub state: FutureState,
    pub timeout_ms: u32,
    pub id: MessageId,
}

impl FrameHeader {
    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.data_type as u8);
        buf.put_u8(self.kind.code());
        buf.put_u8(self.state.bits());
        buf.put_u32_le(self.timeout_ms);
        let mut id = [0u8; MESSAGE_ID_SIZE];
        self.id.write_to(&mut id);
        buf.put_slice(&id);
    }

    /// Parses the 27 header bytes that follow the length prefix.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_SIZE {
            return Err(WireError::InsufficientData {
                needed: HEADER_SIZE,
                have: buf.len(),
            });
        }
        Ok(Self {
            data_type: DataType::try_from(buf[0])?,
            kind: MessageKind::try_from(buf[1])?,
            state: FutureState::from_bits(buf[2])?,
            timeout_ms: u32::from_le_bytes([buf[3], buf[4], buf[5], buf[6]]),
            id: MessageId::read_from(&buf[7..HEADER_SIZE]),
        })
    }
}

/// A complete frame cut from the stream, payload still serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn decode(self, serializer: &dyn Serializer) -> Result<WireMessage, WireError> {
        let body = match self.header.data_type {
            DataType::Empty => None,
            DataType::Envelope | DataType::Cancel => Some(serializer.deserialize(&self.payload)?),
        };
        Ok(WireMessage {
            header: self.header,
            body,
        })
    }
}

/// Routing body carried in the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireBody {
    pub to: RemoteAddress,
    pub from: Aid,
    #[serde(default, skip_serializing_if = "Header::is_empty")]
    pub header: Header,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An envelope as it crosses the transport. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct WireMessage {
    header: FrameHeader,
    body: Option<WireBody>,
}

fn timeout_to_ms(timeout: Option<Duration>) -> u32 {
    timeout
        .map(|t| u32::try_from(t.as_millis()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

impl WireMessage {
    /// Maps an outbound envelope addressed to `to`.
    ///
    /// Fire-and-forget messages carry data, header and sender only; requests add the
    /// timeout and response type tag; responses add the state bitmask and error text.
    pub fn from_envelope(envelope: &Envelope, to: RemoteAddress) -> Self {
        let kind = envelope.kind();
        let (timeout_ms, response_type) = match kind {
            MessageKind::FutureRequest => (
                timeout_to_ms(envelope.timeout()),
                envelope.response_type().map(str::to_string),
            ),
            _ => (0, None),
        };
        let (state, error) = if kind.is_response() {
            (envelope.state(), envelope.error_description().map(str::to_string))
        } else {
            (FutureState::NONE, None)
        };
        Self {
            header: FrameHeader {
                data_type: DataType::Envelope,
                kind,
                state,
                timeout_ms,
                id: envelope.id(),
            },
            body: Some(WireBody {
                to,
                from: envelope.from().clone(),
                header: envelope.header().clone(),
                data: envelope.data().clone(),
                response_type,
                error,
            }),
        }
    }

    /// The frame answering request `id` with a future's outcome.
    pub fn response(id: MessageId, to: RemoteAddress, from: Aid, outcome: &FutureOutcome) -> Self {
        let (kind, state, data, header, error) = match outcome {
            Ok(reply) => {
                let state = if reply.state().is_empty() {
                    FutureState::COMPLETED
                } else {
                    reply.state()
                };
                (
                    MessageKind::FutureResponse,
                    state,
                    reply.data().clone(),
                    reply.header().clone(),
                    None,
                )
            }
            Err(e) => {
                let state = if e.is_cancellation() {
                    FutureState::CANCELED
                } else {
                    FutureState::FAULTED
                };
                (
                    MessageKind::FutureError,
                    state,
                    Value::Null,
                    Header::new(),
                    Some(e.to_string()),
                )
            }
        };
        Self {
            header: FrameHeader {
                data_type: DataType::Envelope,
                kind,
                state,
                timeout_ms: 0,
                id,
            },
            body: Some(WireBody {
                to,
                from,
                header,
                data,
                response_type: None,
                error,
            }),
        }
    }

    /// Asks the other side to cancel its in-flight request `id`.
    pub fn cancel(id: MessageId, to: RemoteAddress, from: Aid) -> Self {
        Self {
            header: FrameHeader {
                data_type: DataType::Cancel,
                kind: MessageKind::FutureRequest,
                state: FutureState::CANCELED,
                timeout_ms: 0,
                id,
            },
            body: Some(WireBody {
                to,
                from,
                header: Header::new(),
                data: Value::Null,
                response_type: None,
                error: None,
            }),
        }
    }

    /// A payload-less frame.
    pub fn empty(id: MessageId) -> Self {
        Self {
            header: FrameHeader {
                data_type: DataType::Empty,
                kind: MessageKind::Default,
                state: FutureState::NONE,
                timeout_ms: 0,
                id,
            },
            body: None,
        }
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn body(&self) -> Option<&WireBody> {
        self.body.as_ref()
    }

    pub fn id(&self) -> MessageId {
        self.header.id
    }

    pub fn kind(&self) -> MessageKind {
        self.header.kind
    }

    pub fn data_type(&self) -> DataType {
        self.header.data_type
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self.header.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(u64::from(ms))),
        }
    }

    /// `[len:4][data_type:1][kind:1][state:1][timeout_ms:4][id:20][payload:N]`, little-endian.
    pub fn encode(&self, serializer: &dyn Serializer) -> Result<Bytes, WireError> {
        let payload = match &self.body {
            Some(body) if self.header.data_type != DataType::Empty => serializer.serialize(body)?,
            _ => Vec::new(),
        };
        let frame_len = HEADER_SIZE + payload.len();
        if frame_len > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge { size: frame_len });
        }
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + frame_len);
        buf.put_u32_le(frame_len as u32);
        self.header.write_to(&mut buf);
        buf.put_slice(&payload);
        Ok(buf.freeze())
    }

    fn envelope_parts(self) -> EnvelopeParts {
        let timeout = self.timeout();
        let header = self.header;
        let mut parts = EnvelopeParts {
            id: header.id,
            kind: header.kind,
            timeout,
            state: header.state,
            ..Default::default()
        };
        if let Some(body) = self.body {
            parts.data = body.data;
            parts.header = body.header;
            parts.from = body.from;
            parts.response_type = body.response_type;
            parts.error = body.error;
        }
        parts
    }

    /// Rebuilds the envelope this frame carries.
    pub fn into_envelope(self) -> Envelope {
        Envelope::from_parts(self.envelope_parts())
    }

    pub(crate) fn into_request_envelope(
        self,
        future: FutureHandle,
        expired: Arc<AtomicBool>,
    ) -> Envelope {
        let mut parts = self.envelope_parts();
        parts.future = Some(future);
        parts.expired = Some(expired);
        Envelope::from_parts(parts)
    }

    /// The error a `FutureError` frame resolves its pending request with.
    pub fn remote_error(&self) -> FutureError {
        let description = self
            .body
            .as_ref()
            .and_then(|b| b.error.clone())
            .unwrap_or_else(|| "remote request failed".to_string());
        FutureError::Remote(description)
    }
}
