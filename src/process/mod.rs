//! Actor processes: authoring surface ([`Actor`], [`receive_fn`], [`ActorContext`]) and the
//! mailbox scheduler ([`Process`]).

mod actor;
mod context;
mod core;

use std::sync::Arc;

use crate::error::ActorError;
use crate::message::Envelope;

pub use actor::{receive_fn, Actor, ActorKind, ReceiveFn};
pub use context::ActorContext;
pub(crate) use context::ContextData;
pub use self::core::{DrainState, Process};
pub(crate) use self::core::{panic_message, Backing, LocalHandler, ProcessSettings, RemoteProxy};

/// Receives handler failures, with the offending envelope when there is one.
pub type ErrorHandler = Arc<dyn Fn(&ActorError, Option<&Envelope>) + Send + Sync>;
