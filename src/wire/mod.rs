//! # Wire Protocol
//!
//! Frame format: `[len:4][data_type:1][kind:1][state:1][timeout_ms:4][id:20][payload:N]`
//!
//! - **len**: byte count after the prefix itself (little-endian u32)
//! - **data_type**: [`DataType`] (empty, envelope, cancel)
//! - **kind**: [`MessageKind`](crate::message::MessageKind) wire code
//! - **state**: [`FutureState`](crate::message::FutureState) bitmask, responses only
//! - **timeout_ms**: request timeout in milliseconds, `0` when unset (little-endian u32)
//! - **id**: [`MessageId`] correlation id, five little-endian u32s
//! - **payload**: [`WireBody`] encoded by a [`Serializer`] picked by key from a
//!   [`SerializerRegistry`]
//!
//! A connection carries frames back to back; [`FrameReader`] cuts them out of arbitrarily
//! split chunks.

mod error;
mod frame;
mod message_id;
mod reader;
mod serializer;

pub use error::WireError;
pub use frame::{
    DataType, Frame, FrameHeader, WireBody, WireMessage, HEADER_SIZE, LENGTH_PREFIX_SIZE,
    MAX_FRAME_SIZE,
};
pub use message_id::{MessageId, MessageIdGenerator, MESSAGE_ID_SIZE};
pub use reader::FrameReader;
pub use serializer::{JsonSerializer, Serializer, SerializerRegistry, DEFAULT_SERIALIZER};
