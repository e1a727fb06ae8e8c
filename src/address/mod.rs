//! # Addressing
//!
//! Immutable identity values used to route messages.
//!
//! - [`Aid`]: a location-transparent `system/actor` coordinate.
//! - [`Pid`]: an `Aid` plus a weak reference to the live local process, handed out by the
//!   registry. A `Pid` whose process is gone (or was never local) is a pure coordinate.
//! - [`Endpoint`] and [`RemoteAddress`]: where a mailbox in another process lives.

mod aid;
mod endpoint;
mod pid;

pub use aid::Aid;
pub use endpoint::{Endpoint, RemoteAddress};
pub use pid::Pid;
