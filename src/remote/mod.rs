//! Remote delivery: proxies forward envelopes as frames through a [`RemoteTransport`];
//! frames read from peers come back in through an [`InboundChannel`].
//!
//! # Main Components
//!
//! - [`RemoteTransport`] - the byte-moving seam; real deployments plug a network client here
//! - [`RemoteBinding`] - per-system pending/in-flight tables and frame routing
//! - [`InboundChannel`] - one per connection, feeds chunks through the frame reader
//! - [`LoopbackNetwork`] - in-process transport joining systems by endpoint

mod binding;
mod inbound;
mod loopback;
mod transport;

pub use binding::RemoteBinding;
pub use inbound::InboundChannel;
pub use loopback::LoopbackNetwork;
pub use transport::{RemoteSettings, RemoteTransport, TransportError};
