//! # Messages
//!
//! [`Message`] is what callers build; [`Envelope`] is what handlers receive. Payloads are
//! untyped [`serde_json::Value`]s and handlers decode them with [`Envelope::data_as`].

mod envelope;
mod kind;

pub use envelope::{Envelope, Header, Message};
pub(crate) use envelope::EnvelopeParts;
pub use kind::{FutureState, MessageKind};
