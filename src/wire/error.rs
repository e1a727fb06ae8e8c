use super::{HEADER_SIZE, MAX_FRAME_SIZE};

/// Wire format error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Not enough data to parse the frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData { needed: usize, have: usize },

    /// Length prefix smaller than the fixed header.
    #[error("invalid frame length: {length} (header is {HEADER_SIZE} bytes)")]
    InvalidLength { length: u32 },

    /// Length prefix larger than the guard.
    #[error("frame too large: {size} bytes (max {MAX_FRAME_SIZE})")]
    FrameTooLarge { size: usize },

    #[error("unknown data type code: {0}")]
    UnknownDataType(u8),

    #[error("unknown message kind code: {0}")]
    UnknownMessageKind(u8),

    #[error("unknown state bits: {0:#04x}")]
    UnknownState(u8),

    #[error("no serializer registered under '{0}'")]
    UnknownSerializer(String),

    #[error("payload serialization failed: {0}")]
    Serialization(String),
}
