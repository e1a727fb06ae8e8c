use std::fmt;
use std::ops::BitOr;

use crate::wire::WireError;

/// What an envelope is for. The discriminants are the wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MessageKind {
    /// Fire-and-forget.
    #[default]
    Default = 0,
    FutureRequest = 1,
    FutureResponse = 2,
    FutureError = 3,
}

impl MessageKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_response(self) -> bool {
        matches!(self, MessageKind::FutureResponse | MessageKind::FutureError)
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = WireError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(MessageKind::Default),
            1 => Ok(MessageKind::FutureRequest),
            2 => Ok(MessageKind::FutureResponse),
            3 => Ok(MessageKind::FutureError),
            other => Err(WireError::UnknownMessageKind(other)),
        }
    }
}

/// Completion state bitmask carried by response frames.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FutureState(u8);

impl FutureState {
    pub const NONE: FutureState = FutureState(0);
    pub const CANCELED: FutureState = FutureState(1);
    pub const COMPLETED: FutureState = FutureState(2);
    pub const FAULTED: FutureState = FutureState(4);
    pub const EMPTY: FutureState = FutureState(8);

    const ALL: u8 = 1 | 2 | 4 | 8;

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Rejects bytes with bits outside the known flags.
    pub fn from_bits(bits: u8) -> Result<Self, WireError> {
        if bits & !Self::ALL != 0 {
            return Err(WireError::UnknownState(bits));
        }
        Ok(FutureState(bits))
    }

    pub fn contains(self, other: FutureState) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FutureState {
    type Output = FutureState;

    fn bitor(self, rhs: Self) -> Self::Output {
        FutureState(self.0 | rhs.0)
    }
}

impl fmt::Debug for FutureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::CANCELED, "CANCELED"),
            (Self::COMPLETED, "COMPLETED"),
            (Self::FAULTED, "FAULTED"),
            (Self::EMPTY, "EMPTY"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "FutureState(NONE)")
        } else {
            write!(f, "FutureState({})", set.join("|"))
        }
    }
}
